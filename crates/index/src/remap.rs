//! Drives the index build while keeping the backing file large enough to
//! hold every appended AVL node, and places tags at the points required for
//! directory-range queries to be correct.
//!
//! Tag placement is the subtle part: a client computes a directory's total
//! by subtracting `query(rank(D), t)` from `query(rank(successor(D)), t)`.
//! For that to work, "the index's state after the first k leaves" must be
//! exactly what `query` sees at rank k — so a tag has to land immediately
//! before a directory's own entry is inserted (so a query on the directory
//! itself sees the state preceding it) and immediately after the last entry
//! inside a directory (so a query on anything past it sees the directory's
//! contents already counted).

use std::fs::File;
use std::io;

use memmap2::MmapMut;

use crate::build::IndexBuilder;
use crate::IndexError;

/// Everything the caller needs after a build.
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    /// Offset of the root table, also recorded in the trie header's
    /// `indexroot` field by [`IndexBuilder::new`].
    pub roots_offset: u64,
    /// Final size of the file after tight truncation.
    pub real_size: u64,
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn read_entry(buf: &[u8], i: u64) -> (Vec<u8>, u64) {
    let reader = trie::TrieReader::new(buf).expect("buffer must hold a valid trie");
    let mut path = Vec::new();
    reader.get_path(i, &mut path);
    let off = reader.leaf_offset(i);
    (path, off)
}

#[allow(unsafe_code)]
fn map_mut(file: &File) -> io::Result<MmapMut> {
    unsafe { MmapMut::map_mut(file) }
}

fn initial_size_estimate(trie_end: u64, count: u64) -> u64 {
    let roots_bytes = count * 8;
    let mut size = trie_end + roots_bytes + 64; // slack for alignment + a few AVL nodes
    size += size / 10;
    size
}

/// Build the AVL index for the trie already written to `file`, from byte
/// offset `trie_end` (its `real_size()`) for `count` leaves, with `pathsep`
/// the separator byte recorded in its header.
///
/// # Errors
///
/// Propagates I/O and mmap errors from growing or remapping the file.
pub fn build_index(
    file: &mut File,
    trie_end: u64,
    count: u64,
    pathsep: u8,
) -> Result<BuildSummary, IndexError> {
    let mut total_size = initial_size_estimate(trie_end, count);
    file.set_len(total_size)?;
    let mut mmap = map_mut(file)?;

    let (mut ib, delta) = IndexBuilder::new(&mut mmap[..], trie_end, count);

    for idx in 0..count {
        if total_size - ib.real_size() < delta {
            let mut new_total = total_size + delta;
            new_total += new_total / 10;
            drop(mmap);
            file.set_len(new_total)?;
            mmap = map_mut(file)?;
            total_size = new_total;
            ib.rebase();
            tracing::debug!(idx, new_total, "grew index file during build");
        }

        let (prev_path, prev_off) = read_entry(&mmap, idx);
        let curr_path = if idx + 1 < count {
            Some(read_entry(&mmap, idx + 1).0)
        } else {
            None
        };

        let common = match &curr_path {
            Some(curr) => common_prefix_len(&prev_path, curr),
            None => 0,
        };

        if let Some(curr) = &curr_path {
            let prev_is_exact_prefix = common == prev_path.len();
            let enters_directory = curr.get(common) == Some(&pathsep)
                || (common > 0 && prev_path.get(common - 1) == Some(&pathsep));
            if prev_is_exact_prefix && enters_directory {
                ib.tag(&mut mmap[..]);
            }
        }

        ib.add(&mut mmap[..], prev_off);

        match &curr_path {
            None => {
                ib.tag(&mut mmap[..]);
            }
            Some(_) => {
                if prev_path[common..].contains(&pathsep) {
                    ib.tag(&mut mmap[..]);
                }
            }
        }
    }

    let roots_offset = ib.roots_offset();
    let real_size = if count == 0 { trie_end } else { ib.real_size() };
    ib.finish();

    drop(mmap);
    file.set_len(real_size)?;
    Ok(BuildSummary {
        roots_offset,
        real_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::query;
    use metadata::Leaf;
    use std::io::{Read, Seek, SeekFrom};
    use trie::TrieBuilder;

    fn build_full(entries: &[(&str, u64, u64)]) -> (File, BuildSummary, u64) {
        let tmp = tempfile::tempfile().unwrap();
        let mut b = TrieBuilder::new(tmp, b'/').unwrap();
        for (path, size, atime) in entries {
            b.add(
                path.as_bytes(),
                Leaf {
                    size: *size,
                    atime: *atime,
                },
            )
            .unwrap();
        }
        let (mut file, trie_end) = b.finish().unwrap();
        let summary = build_index(&mut file, trie_end, entries.len() as u64, b'/').unwrap();
        (file, summary, entries.len() as u64)
    }

    fn read_all(file: &mut File) -> Vec<u8> {
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn scenario_a_directory_range_matches_naive_sum() {
        let (mut file, summary, count) = build_full(&[
            ("a", 10, 100),
            ("a/b", 10, 100),
            ("a/c", 10, 100),
            ("a/c/d", 10, 100),
            ("a/c/e", 10, 100),
            ("b", 10, 100),
        ]);
        let bytes = read_all(&mut file);
        let reader = trie::TrieReader::new(&bytes).unwrap();
        assert_eq!(reader.count(), count);

        assert_eq!(reader.rank(b"a"), 0);
        assert_eq!(reader.rank(b"a/"), 1);
        let succ = collate::make_successor(&reader.collator(), b"a");
        let b = reader.rank(&succ);
        assert_eq!(b, 5);

        // Scenario A: query(5, 101) - query(1, 101) = 40 (a/b, a/c, a/c/d, a/c/e);
        // rank("a/") = 1 starts the range just past "a" itself, excluding it.
        let hi = query(&bytes, summary.roots_offset, count, b as i64, 101);
        let lo = query(&bytes, summary.roots_offset, count, 1, 101);
        assert_eq!(hi - lo, 40);
    }

    #[test]
    fn query_is_monotone_and_matches_total_at_infinity() {
        let (mut file, summary, count) = build_full(&[
            ("a", 5, 10),
            ("b", 7, 20),
            ("c", 3, 30),
        ]);
        let bytes = read_all(&mut file);

        assert_eq!(
            query(&bytes, summary.roots_offset, count, count as i64, u64::MAX),
            15
        );
        assert_eq!(query(&bytes, summary.roots_offset, count, 2, 0), 0);

        let low = query(&bytes, summary.roots_offset, count, count as i64, 15);
        let high = query(&bytes, summary.roots_offset, count, count as i64, 25);
        assert!(high >= low);
    }

    fn directory_range(bytes: &[u8], roots_offset: u64, count: u64, dir: &str, cutoff: u64) -> u64 {
        let reader = trie::TrieReader::new(bytes).unwrap();
        let mut start_key = dir.as_bytes().to_vec();
        start_key.push(b'/');
        let a = reader.rank(&start_key);
        let succ = collate::make_successor(&reader.collator(), dir.as_bytes());
        let b = reader.rank(&succ);
        let hi = query(bytes, roots_offset, count, b as i64, cutoff);
        let lo = query(bytes, roots_offset, count, a as i64, cutoff);
        hi - lo
    }

    #[test]
    fn directory_at_the_very_start_of_the_trie_is_tagged_correctly() {
        let (mut file, summary, count) = build_full(&[("a", 1, 100), ("a/b", 2, 100), ("b", 3, 100)]);
        let bytes = read_all(&mut file);
        assert_eq!(directory_range(&bytes, summary.roots_offset, count, "a", 101), 2);
    }

    #[test]
    fn directory_whose_last_descendant_is_the_tries_last_entry_is_tagged_correctly() {
        let (mut file, summary, count) = build_full(&[("a", 1, 100), ("b", 2, 100), ("b/c", 3, 100)]);
        let bytes = read_all(&mut file);
        assert_eq!(directory_range(&bytes, summary.roots_offset, count, "b", 101), 3);
    }

    #[test]
    fn adjacent_sibling_directories_are_both_tagged_correctly() {
        let (mut file, summary, count) = build_full(&[
            ("a", 1, 100),
            ("a/x", 2, 100),
            ("b", 3, 100),
            ("b/y", 4, 100),
        ]);
        let bytes = read_all(&mut file);
        assert_eq!(directory_range(&bytes, summary.roots_offset, count, "a", 101), 2);
        assert_eq!(directory_range(&bytes, summary.roots_offset, count, "b", 101), 4);
    }

    #[test]
    fn file_name_that_is_a_prefix_of_a_directory_name_does_not_confuse_tagging() {
        let (mut file, summary, count) =
            build_full(&[("ab", 1, 100), ("abc", 2, 100), ("abc/d", 3, 100)]);
        let bytes = read_all(&mut file);
        assert_eq!(directory_range(&bytes, summary.roots_offset, count, "abc", 101), 3);
    }

    #[test]
    fn growth_path_is_exercised_with_many_entries() {
        let entries: Vec<(String, u64, u64)> = (0..2000)
            .map(|i| (format!("f{i:05}"), 1u64, i as u64))
            .collect();
        let refs: Vec<(&str, u64, u64)> =
            entries.iter().map(|(p, s, a)| (p.as_str(), *s, *a)).collect();
        let (mut file, summary, count) = build_full(&refs);
        let bytes = read_all(&mut file);
        let total = query(&bytes, summary.roots_offset, count, count as i64, u64::MAX);
        assert_eq!(total, count);
    }
}
