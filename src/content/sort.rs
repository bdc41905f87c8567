use std::collections::HashMap;

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::reader::ContentReader;
use super::record::{convert_record, Record, SortEnvelope, SortableRecord};
use super::writer::{seal_into_reader, ContentWriter};
use crate::constants::{DEFAULT_ARRAY_KEY, MAX_BUFFER_SIZE};
use crate::error::{Error, Result};

/// Tuning for the external sort. `buffer_size` bounds both the number
/// of distinct keys held in memory and the size of each on-disk run.
#[derive(Debug, Clone)]
pub struct SortOptions {
    pub ascending: bool,
    pub buffer_size: usize,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            ascending: true,
            buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

impl SortOptions {
    pub fn ascending(ascending: bool) -> Self {
        Self {
            ascending,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config {
                message: "buffer_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Sorts a reader by the key its records embed, in the requested
/// direction. Ties are collapsed to the first occurrence, exactly as
/// with [`sort_by_calculated_key`]; use [`merge_sorted_readers`] to
/// merge without dropping ties.
pub fn sort_reader<T>(reader: &mut ContentReader, ascending: bool) -> Result<ContentReader>
where
    T: SortableRecord + DeserializeOwned,
{
    sort_reader_with::<T>(reader, SortOptions::ascending(ascending))
}

pub fn sort_reader_with<T>(reader: &mut ContentReader, options: SortOptions) -> Result<ContentReader>
where
    T: SortableRecord + DeserializeOwned,
{
    sort_by_calculated_key_with(
        reader,
        |record| Ok(convert_record::<T>(record.clone())?.sort_key()),
        options,
    )
}

/// Sorts by a caller-computed key. Only the first record seen per
/// distinct key survives; the attribute order inside records may change
/// across the round-trip.
pub fn sort_by_calculated_key<F>(
    reader: &mut ContentReader,
    key_fn: F,
    ascending: bool,
) -> Result<ContentReader>
where
    F: Fn(&Record) -> Result<String>,
{
    sort_by_calculated_key_with(reader, key_fn, SortOptions::ascending(ascending))
}

pub fn sort_by_calculated_key_with<F>(
    reader: &mut ContentReader,
    key_fn: F,
    options: SortOptions,
) -> Result<ContentReader>
where
    F: Fn(&Record) -> Result<String>,
{
    options.validate()?;
    let mut runs = split_into_sorted_runs(reader, &key_fn, &options)?;
    let result = merge_runs(&runs, &options);
    for run in &mut runs {
        if let Err(err) = run.close() {
            tracing::warn!("closing sort run failed: {err}");
        }
    }
    result
}

/// K-way merges readers that are already sorted, without wrapping or
/// deduplication: every input record appears in the output, ties in an
/// unspecified order. Run failures end that run only.
pub fn merge_sorted_readers<T>(
    sorted_readers: &[ContentReader],
    ascending: bool,
) -> Result<ContentReader>
where
    T: SortableRecord + Serialize + DeserializeOwned,
{
    if sorted_readers.is_empty() {
        return Ok(ContentReader::empty(DEFAULT_ARRAY_KEY));
    }
    let mut writer = ContentWriter::new(DEFAULT_ARRAY_KEY, true, false)?;
    let mut heads: Vec<Option<T>> = (0..sorted_readers.len()).map(|_| None).collect();
    let mut exhausted = vec![false; sorted_readers.len()];
    loop {
        let mut candidate: Option<usize> = None;
        for i in 0..sorted_readers.len() {
            if heads[i].is_none() && !exhausted[i] {
                match sorted_readers[i].next_record::<T>() {
                    Ok(Some(item)) => heads[i] = Some(item),
                    Ok(None) | Err(_) => exhausted[i] = true,
                }
            }
            let replaces = match candidate {
                None => heads[i].is_some(),
                Some(current) => match (&heads[current], &heads[i]) {
                    (Some(leader), Some(challenger)) => {
                        emerges_first(&challenger.sort_key(), &leader.sort_key(), ascending)
                    }
                    _ => false,
                },
            };
            if replaces {
                candidate = Some(i);
            }
        }
        let Some(current) = candidate else { break };
        if let Some(item) = heads[current].take() {
            writer.write(&item);
        }
    }
    seal_into_reader(writer)
}

/// Phase 1: split the input into key-sorted runs of at most
/// `buffer_size` distinct keys each. Duplicate keys inside one buffer
/// window are dropped, first write wins. The input reader is reset
/// afterwards.
fn split_into_sorted_runs<F>(
    reader: &mut ContentReader,
    key_fn: &F,
    options: &SortOptions,
) -> Result<Vec<ContentReader>>
where
    F: Fn(&Record) -> Result<String>,
{
    let mut runs = Vec::new();
    match fill_runs(reader, key_fn, options, &mut runs) {
        Ok(()) => Ok(runs),
        Err(err) => {
            for mut run in runs {
                if let Err(close_err) = run.close() {
                    tracing::warn!("closing sort run failed: {close_err}");
                }
            }
            Err(err)
        }
    }
}

fn fill_runs<F>(
    reader: &mut ContentReader,
    key_fn: &F,
    options: &SortOptions,
    runs: &mut Vec<ContentReader>,
) -> Result<()>
where
    F: Fn(&Record) -> Result<String>,
{
    let mut envelopes: HashMap<String, SortEnvelope> = HashMap::new();
    let mut keys: Vec<String> = Vec::with_capacity(options.buffer_size.min(MAX_BUFFER_SIZE));
    loop {
        match reader.next_record::<Record>() {
            Ok(Some(record)) => {
                let key = key_fn(&record)?;
                if envelopes.contains_key(&key) {
                    continue;
                }
                envelopes.insert(
                    key.clone(),
                    SortEnvelope {
                        key: key.clone(),
                        record: Value::Object(record),
                    },
                );
                keys.push(key);
                if keys.len() == options.buffer_size {
                    runs.push(write_sorted_run(&mut envelopes, &mut keys, options)?);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    if let Some(err) = reader.error() {
        return Err(err);
    }
    reader.reset();
    if !keys.is_empty() {
        runs.push(write_sorted_run(&mut envelopes, &mut keys, options)?);
    }
    Ok(())
}

/// Sorts the buffered keys and writes their envelopes to a fresh run,
/// draining the buffer.
fn write_sorted_run(
    envelopes: &mut HashMap<String, SortEnvelope>,
    keys: &mut Vec<String>,
    options: &SortOptions,
) -> Result<ContentReader> {
    if options.ascending {
        keys.par_sort_unstable();
    } else {
        keys.par_sort_unstable_by(|a, b| b.cmp(a));
    }
    let mut writer = ContentWriter::new(DEFAULT_ARRAY_KEY, true, false)?;
    for key in keys.drain(..) {
        if let Some(envelope) = envelopes.remove(&key) {
            writer.write(&envelope);
        }
    }
    seal_into_reader(writer)
}

/// Phase 2: k-way merge of the sorted runs. One buffered head per run;
/// a head whose key ties the current candidate is dropped, so exactly
/// one record per distinct key survives, the one from the earliest run.
fn merge_runs(runs: &[ContentReader], options: &SortOptions) -> Result<ContentReader> {
    if runs.is_empty() {
        return Ok(ContentReader::empty(DEFAULT_ARRAY_KEY));
    }
    let mut writer = ContentWriter::new(DEFAULT_ARRAY_KEY, true, false)?;
    let mut heads: Vec<Option<SortEnvelope>> = (0..runs.len()).map(|_| None).collect();
    let mut exhausted = vec![false; runs.len()];
    loop {
        let mut candidate: Option<usize> = None;
        for i in 0..runs.len() {
            if heads[i].is_none() && !exhausted[i] {
                match runs[i].next_record::<SortEnvelope>() {
                    Ok(Some(envelope)) => heads[i] = Some(envelope),
                    // EOF and per-run failures both end the run.
                    Ok(None) | Err(_) => exhausted[i] = true,
                }
            }
            if let Some(current) = candidate {
                let tied = match (&heads[current], &heads[i]) {
                    (Some(leader), Some(challenger)) => leader.key == challenger.key,
                    _ => false,
                };
                if tied && i != current {
                    heads[i] = None;
                }
            }
            let replaces = match candidate {
                None => heads[i].is_some(),
                Some(current) => match (&heads[current], &heads[i]) {
                    (Some(leader), Some(challenger)) => {
                        emerges_first(&challenger.key, &leader.key, options.ascending)
                    }
                    _ => false,
                },
            };
            if replaces {
                candidate = Some(i);
            }
        }
        let Some(current) = candidate else { break };
        if let Some(envelope) = heads[current].take() {
            writer.write(&envelope.record);
        }
    }
    seal_into_reader(writer)
}

/// Whether `challenger` should leave the merge before `current` in the
/// requested direction: strictly smaller when ascending, strictly
/// larger when descending. Keys compare as raw bytes.
fn emerges_first(challenger: &str, current: &str, ascending: bool) -> bool {
    if ascending {
        challenger < current
    } else {
        challenger > current
    }
}
