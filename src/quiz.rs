use crate::db::Entry;
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

/// Number of entries drawn per quiz
const QUESTIONS: usize = 10;
/// Number of lines drawn from an entry before giving up on it
const ATTEMPTS: usize = 10;
const MIN_CLUE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clue {
    pub id: u64,
    pub title: String,
    pub creator: String,
    pub clue: String,
}

/// Whether a line is worth asking about
pub fn is_substantial(line: &str) -> bool {
    line.chars().count() >= MIN_CLUE_LEN || line.contains("**")
}

/// Picks a clue from the front of an entry's notes, the part before the first `---`
///
/// Lines are drawn with replacement and stripped of leading spaces and `+` bullets. Returns
/// `None` when no drawn line is substantial.
pub fn pick_clue<R: Rng + ?Sized>(notes: &str, rng: &mut R) -> Option<String> {
    let front = notes.split("---").next().unwrap_or_default();
    let lines: Vec<&str> = front.split('\n').collect();

    for _ in 0..ATTEMPTS {
        let line = lines
            .choose(rng)?
            .trim_start_matches(|c: char| c == ' ' || c == '+');
        if is_substantial(line) {
            return Some(line.to_owned());
        }
    }
    None
}

/// Builds a quiz from up to ten entries in random order
///
/// Entries without a substantial line are left out.
pub fn questions<R: Rng + ?Sized>(entries: &[(u64, Entry)], rng: &mut R) -> Vec<Clue> {
    let mut picked: Vec<&(u64, Entry)> = entries.iter().collect();
    picked.shuffle(rng);
    picked.truncate(QUESTIONS);

    picked
        .into_iter()
        .filter_map(|(id, e)| {
            pick_clue(&e.notes, rng).map(|clue| Clue {
                id: *id,
                title: e.title.clone(),
                creator: e.creator.clone(),
                clue,
            })
        })
        .collect()
}
