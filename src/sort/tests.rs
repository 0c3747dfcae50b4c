//! Unit tests for the sort primitive: both hand-rolled backends against the
//! library sort, plus the block-cooperative contract.

#[cfg(test)]
mod tests {
    use crate::sort::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::thread;

    fn reference_sorted(mut v: Vec<u32>) -> Vec<u32> {
        v.sort();
        v
    }

    fn cases() -> Vec<Vec<u32>> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut out = Vec::new();
        for len in [0usize, 1, 4, 5, 1000] {
            // randomized
            out.push((0..len).map(|_| rng.gen_range(0..500)).collect());
            // already sorted
            out.push((0..len as u32).collect());
            // reverse sorted
            out.push((0..len as u32).rev().collect());
            // all equal
            out.push(vec![7; len]);
        }
        out
    }

    #[test]
    fn quicksort_matches_reference() {
        for case in cases() {
            let expected = reference_sorted(case.clone());
            let mut v = case;
            quicksort(&mut v);
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn insertion_sort_matches_reference() {
        for case in cases() {
            let expected = reference_sorted(case.clone());
            let mut v = case;
            insertion_sort(&mut v);
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn public_sort_matches_reference() {
        for case in cases() {
            let expected = reference_sorted(case.clone());
            let mut v = case;
            sort(&mut v);
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn comparator_backends_agree_on_descending() {
        let less = |a: &u32, b: &u32| b < a;
        for case in cases() {
            let mut expected = reference_sorted(case.clone());
            expected.reverse();

            let mut quick = case.clone();
            quicksort_by(&mut quick, &less);
            assert_eq!(quick, expected);

            let mut insertion = case.clone();
            insertion_sort_by(&mut insertion, &less);
            assert_eq!(insertion, expected);

            let mut public = case;
            sort_by(&mut public, less);
            assert_eq!(public, expected);
        }
    }

    #[test]
    fn comparator_handles_equal_keys() {
        // Pairs ordered by the first element only; the comparator never
        // reports less for equal keys.
        let mut v: Vec<(u32, u32)> = vec![(2, 0), (1, 1), (2, 2), (1, 3), (2, 4)];
        quicksort_by(&mut v, &|a: &(u32, u32), b: &(u32, u32)| a.0 < b.0);
        let keys: Vec<u32> = v.iter().map(|p| p.0).collect();
        assert_eq!(keys, vec![1, 1, 2, 2, 2]);
    }

    #[test]
    fn sequential_block_sorts_in_place() {
        let mut v = vec![3u32, 1, 2];
        sort_in_block(&SequentialBlock, &BlockSlice::new(&mut v));
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn block_sort_visible_to_all_members() {
        const MEMBERS: usize = 4;
        let mut data: Vec<u32> = (0..256u32).rev().collect();
        let expected = reference_sorted(data.clone());

        let shared = BlockSlice::new(&mut data);
        let observed = thread::scope(|scope| {
            let shared = &shared;
            let handles: Vec<_> = ThreadBlock::group(MEMBERS)
                .into_iter()
                .map(|ctx| {
                    scope.spawn(move || {
                        sort_in_block(&ctx, shared);
                        // Safe to read: the barrier has published the
                        // leader's writes to every member.
                        unsafe { shared.leader_view().to_vec() }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });

        for view in observed {
            assert_eq!(view, expected);
        }
        assert_eq!(data, expected);
    }

    #[test]
    fn block_sort_comparator_variant() {
        let mut v = vec![1u32, 5, 3, 2];
        sort_in_block_by(&SequentialBlock, &BlockSlice::new(&mut v), |a, b| b < a);
        assert_eq!(v, vec![5, 3, 2, 1]);
    }
}
