use crate::db::Entry;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::{cmp::Reverse, collections::BTreeMap};

const TOP_CREATORS: usize = 20;
const EXTREMES: usize = 16;
const LENGTH_BUCKET: usize = 200;

#[derive(Debug, PartialEq, Serialize)]
pub struct Histogram<L> {
    pub data: Vec<(L, usize)>,
    /// Largest count, used to scale bars
    pub maxval: usize,
}

impl<L> Histogram<L> {
    fn new(data: Vec<(L, usize)>) -> Self {
        let maxval = data.iter().map(|(_, c)| *c).max().unwrap_or(0);
        Self { data, maxval }
    }
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub nworks: usize,
    pub ncreators: usize,
    /// Most prolific creators with their number of works
    pub nworks_top: Vec<(String, usize)>,
    /// Number of creators per number of works
    pub nworks_hist: Histogram<usize>,
    /// Entries added per month, `YYYY-MM`
    pub months_hist: Histogram<String>,
    /// Entries per note length bucket, labelled by the bucket's lower bound
    pub lengths_hist: Histogram<usize>,
    pub longest: Vec<(String, usize)>,
    pub shortest: Vec<(String, usize)>,
    pub total_len: usize,
    /// `None` for an empty group
    pub avg_len: Option<f64>,
}

pub fn note_len(notes: &str) -> usize {
    notes.chars().count()
}

#[tracing::instrument(level = "debug", skip(entries))]
pub fn compute(entries: &[(u64, Entry)], today: NaiveDate) -> Stats {
    let nworks = entries.len();

    let mut creators: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, e) in entries {
        *creators.entry(e.creator.as_str()).or_default() += 1;
    }
    let ncreators = creators.len();

    let mut nworks_top: Vec<(String, usize)> =
        creators.iter().map(|(c, n)| (c.to_string(), *n)).collect();
    nworks_top.sort_by(|(a, na), (b, nb)| nb.cmp(na).then_with(|| a.cmp(b)));
    nworks_top.truncate(TOP_CREATORS);

    let mut per_count: BTreeMap<usize, usize> = BTreeMap::new();
    for n in creators.values() {
        *per_count.entry(*n).or_default() += 1;
    }
    let nworks_hist = Histogram::new(per_count.into_iter().collect());

    let months_hist = Histogram::new(months(entries, today));

    let mut lengths: Vec<(String, usize)> = entries
        .iter()
        .map(|(_, e)| (e.title.clone(), note_len(&e.notes)))
        .collect();

    let lengths_hist = Histogram::new(length_buckets(lengths.iter().map(|(_, l)| *l)));

    lengths.sort_by_key(|(_, l)| Reverse(*l));
    let longest = lengths.iter().take(EXTREMES).cloned().collect();
    let shortest = lengths.iter().rev().take(EXTREMES).cloned().collect();

    let total_len: usize = lengths.iter().map(|(_, l)| l).sum();
    let avg_len = if nworks == 0 {
        None
    } else {
        Some(total_len as f64 / nworks as f64)
    };

    Stats {
        nworks,
        ncreators,
        nworks_top,
        nworks_hist,
        months_hist,
        lengths_hist,
        longest,
        shortest,
        total_len,
        avg_len,
    }
}

/// Counts entries per month, from the earliest entry's month through the current one
fn months(entries: &[(u64, Entry)], today: NaiveDate) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for (_, e) in entries {
        let d = e.date_added;
        *counts.entry((d.year(), d.month())).or_default() += 1;
    }

    let mut current = match counts.keys().next() {
        Some(first) => *first,
        None => return Vec::new(),
    };
    let last = counts
        .keys()
        .next_back()
        .copied()
        .unwrap_or(current)
        .max((today.year(), today.month()));

    let mut data = Vec::new();
    while current <= last {
        let (y, m) = current;
        data.push((
            format!("{:04}-{:02}", y, m),
            counts.get(&current).copied().unwrap_or(0),
        ));
        current = if m == 12 { (y + 1, 1) } else { (y, m + 1) };
    }
    data
}

/// Counts lengths per fixed width bucket, from zero through the largest bucket
fn length_buckets(lengths: impl Iterator<Item = usize>) -> Vec<(usize, usize)> {
    let mut counts: Vec<usize> = Vec::new();
    for l in lengths {
        let bucket = l / LENGTH_BUCKET;
        if bucket >= counts.len() {
            counts.resize(bucket + 1, 0);
        }
        counts[bucket] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i * LENGTH_BUCKET, c))
        .collect()
}
