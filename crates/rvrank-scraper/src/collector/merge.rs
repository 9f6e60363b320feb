use std::collections::HashSet;

use rvrank_core::ListingRecord;

/// Output of [`merge_ranked`].
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub records: Vec<ListingRecord>,
    pub duplicates_dropped: usize,
}

/// Deduplicates `records` by id, keeping the first occurrence, and stamps
/// positional ranks `1..=n` on the survivors.
///
/// Input must already be in merge order (ascending sub-range, then page,
/// then API order). Feeding the output back in yields the same output.
#[must_use]
pub fn merge_ranked(records: impl IntoIterator<Item = ListingRecord>) -> Merged {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut duplicates_dropped = 0usize;

    for mut record in records {
        if !seen.insert(record.id.clone()) {
            duplicates_dropped += 1;
            continue;
        }
        record.rank = u32::try_from(merged.len() + 1).unwrap_or(u32::MAX);
        merged.push(record);
    }

    Merged {
        records: merged,
        duplicates_dropped,
    }
}

#[cfg(test)]
mod tests {
    use rvrank_core::{Category, Condition, SearchContext};

    use super::*;

    fn record(id: &str) -> ListingRecord {
        let ctx = SearchContext::new(
            "60616",
            50,
            Category::new("Class B", "198068"),
            Condition::New,
        );
        ListingRecord::new(id, ctx)
    }

    fn ids(merged: &Merged) -> Vec<&str> {
        merged.records.iter().map(|r| r.id.as_str()).collect()
    }

    fn ranks(merged: &Merged) -> Vec<u32> {
        merged.records.iter().map(|r| r.rank).collect()
    }

    #[test]
    fn ranks_are_positional_from_one() {
        let merged = merge_ranked(["a", "b", "c"].map(record));
        assert_eq!(ids(&merged), ["a", "b", "c"]);
        assert_eq!(ranks(&merged), [1, 2, 3]);
        assert_eq!(merged.duplicates_dropped, 0);
    }

    #[test]
    fn boundary_duplicate_keeps_first_occurrence_without_rank_gaps() {
        // "c" sits on the shared boundary of two adjacent bands.
        let merged = merge_ranked(["a", "b", "c", "c", "d", "e"].map(record));
        assert_eq!(ids(&merged), ["a", "b", "c", "d", "e"]);
        assert_eq!(ranks(&merged), [1, 2, 3, 4, 5]);
        assert_eq!(merged.duplicates_dropped, 1);
    }

    #[test]
    fn first_occurrence_wins_on_its_band_metadata() {
        let mut first = record("x");
        first.price_band_max = Some(5_000);
        let mut second = record("x");
        second.price_band_min = Some(5_000);
        let merged = merge_ranked([first, second]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].price_band_max, Some(5_000));
    }

    #[test]
    fn merge_is_idempotent() {
        let input: Vec<ListingRecord> = ["a", "b", "b", "c", "a", "d"].map(record).to_vec();
        let once = merge_ranked(input.clone());
        let again = merge_ranked(input);
        assert_eq!(once, again);

        let twice = merge_ranked(once.records.clone());
        assert_eq!(twice.records, once.records);
        assert_eq!(twice.duplicates_dropped, 0);
    }

    #[test]
    fn stale_ranks_on_input_are_overwritten() {
        let mut a = record("a");
        a.rank = 7;
        let mut b = record("b");
        b.rank = 3;
        let merged = merge_ranked([a, b]);
        assert_eq!(ranks(&merged), [1, 2]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let merged = merge_ranked(Vec::<ListingRecord>::new());
        assert!(merged.records.is_empty());
        assert_eq!(merged.duplicates_dropped, 0);
    }
}
