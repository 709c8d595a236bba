// ============================================
// Candidate Selector
// ============================================
//
// Greedy explore/exploit batch selection:
//   numExplore = floor(N * ratio), numExploit = N - numExplore
//   exploit    = top numExploit by similarity to the current item
//   explore    = uniform sample from the lower half of the sorted pool
//   batch      = exploit + explore, shuffled
//
// Randomness comes only from the injected Rng (explore sampling and the
// final shuffle), so a seeded source makes selection reproducible.

use crate::models::Item;
use crate::utils::similarity;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub item: Item,
    pub similarity: f32,
    /// Position in the pool after sorting by similarity (0 = most similar)
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    batch_size: usize,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CandidateSelector {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Score candidates against `reference` and sort best first.
    /// Candidates without an embedding score 0.
    pub fn score(&self, reference: &[f32], candidates: Vec<Item>) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|item| ScoredCandidate {
                similarity: similarity(Some(reference), item.embedding.as_deref()),
                item,
                rank: 0,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (rank, candidate) in scored.iter_mut().enumerate() {
            candidate.rank = rank;
        }
        scored
    }

    /// Pick the next batch of `min(N, pool)` candidates.
    ///
    /// Without a reference embedding the pool is taken in provider order.
    pub fn select<R: Rng + ?Sized>(
        &self,
        candidates: Vec<Item>,
        reference: Option<&[f32]>,
        exploration_ratio: f64,
        rng: &mut R,
    ) -> Vec<ScoredCandidate> {
        let Some(reference) = reference else {
            debug!(
                pool_size = candidates.len(),
                "No reference embedding, keeping provider order"
            );
            return candidates
                .into_iter()
                .take(self.batch_size)
                .enumerate()
                .map(|(rank, item)| ScoredCandidate {
                    item,
                    similarity: 0.0,
                    rank,
                })
                .collect();
        };

        let scored = self.score(reference, candidates);
        let pool_size = scored.len();

        if pool_size <= self.batch_size {
            let mut all = scored;
            all.shuffle(rng);
            return all;
        }

        let ratio = exploration_ratio.clamp(0.0, 1.0);
        let num_explore = (self.batch_size as f64 * ratio).floor() as usize;
        let num_exploit = self.batch_size - num_explore;

        let picks = explore_exploit_indices(pool_size, num_exploit, num_explore, rng);

        let mut slots: Vec<Option<ScoredCandidate>> = scored.into_iter().map(Some).collect();
        let mut selected: Vec<ScoredCandidate> =
            picks.into_iter().filter_map(|i| slots[i].take()).collect();
        selected.shuffle(rng);

        debug!(
            pool_size = pool_size,
            exploit = num_exploit,
            explore = num_explore,
            selected = selected.len(),
            "Candidate selection completed"
        );

        selected
    }
}

/// Sorted-pool indices for a batch; requires `pool_size > num_exploit + num_explore`.
///
/// Exploit takes `0..num_exploit`. Explore samples uniformly from
/// `max(pool/2, num_exploit)..pool`; if that range is too small the
/// shortfall comes from the unpicked indices just above it, nearest first.
fn explore_exploit_indices<R: Rng + ?Sized>(
    pool_size: usize,
    num_exploit: usize,
    num_explore: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut picks: Vec<usize> = (0..num_exploit).collect();

    let explore_start = (pool_size / 2).max(num_exploit);
    let range_len = pool_size - explore_start;
    let sampled = num_explore.min(range_len);
    picks.extend(
        index::sample(rng, range_len, sampled)
            .into_iter()
            .map(|i| explore_start + i),
    );

    let shortfall = num_explore - sampled;
    picks.extend((num_exploit..explore_start).rev().take(shortfall));

    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Pool whose similarity to [1, 0] strictly decreases with the index,
    /// handed to the selector in shuffled order.
    fn pool(size: usize, rng: &mut StdRng) -> Vec<Item> {
        let mut items: Vec<Item> = (0..size)
            .map(|i| {
                let angle = i as f32 * 0.15;
                Item::new(format!("item-{:02}", i), "", "")
                    .with_embedding(Arc::from(vec![angle.cos(), angle.sin()]))
            })
            .collect();
        items.shuffle(rng);
        items
    }

    const REFERENCE: [f32; 2] = [1.0, 0.0];

    #[test]
    fn test_score_sorts_descending_and_ranks() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut items = pool(5, &mut rng);
        items.push(Item::new("no-embedding", "", ""));

        let scored = CandidateSelector::default().score(&REFERENCE, items);
        assert_eq!(scored[0].item.id, "item-00");
        assert_eq!(scored.last().unwrap().item.id, "no-embedding");
        assert_eq!(scored.last().unwrap().similarity, 0.0);
        for (i, c) in scored.iter().enumerate() {
            assert_eq!(c.rank, i);
        }
        assert!(scored.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_balanced_batch_splits_halves() {
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let items = pool(20, &mut rng);
            let selected = selector.select(items, Some(&REFERENCE), 0.5, &mut rng);

            assert_eq!(selected.len(), 6);
            let exploit: Vec<_> = selected.iter().filter(|c| c.rank < 10).collect();
            let explore: Vec<_> = selected.iter().filter(|c| c.rank >= 10).collect();
            assert_eq!(exploit.len(), 3);
            assert_eq!(explore.len(), 3);

            let exploit_ranks: HashSet<_> = exploit.iter().map(|c| c.rank).collect();
            assert_eq!(exploit_ranks, HashSet::from([0, 1, 2]));

            let ids: HashSet<_> = selected.iter().map(|c| c.item.id.clone()).collect();
            assert_eq!(ids.len(), 6);
        }
    }

    #[test]
    fn test_explore_sampling_covers_lower_half() {
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(99);
        let mut seen_ranks = HashSet::new();

        for _ in 0..200 {
            let selected = selector.select(pool(20, &mut rng), Some(&REFERENCE), 0.5, &mut rng);
            seen_ranks.extend(selected.iter().filter(|c| c.rank >= 10).map(|c| c.rank));
        }
        assert_eq!(seen_ranks, (10..20).collect::<HashSet<_>>());
    }

    #[test]
    fn test_pure_exploitation_and_exploration() {
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(3);

        let exploit = selector.select(pool(20, &mut rng), Some(&REFERENCE), 0.0, &mut rng);
        let mut ranks: Vec<_> = exploit.iter().map(|c| c.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);

        let explore = selector.select(pool(20, &mut rng), Some(&REFERENCE), 1.0, &mut rng);
        assert_eq!(explore.len(), 6);
        assert!(explore.iter().all(|c| c.rank >= 10));
    }

    #[test]
    fn test_small_pool_returns_everything() {
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(5);

        let selected = selector.select(pool(5, &mut rng), Some(&REFERENCE), 0.5, &mut rng);
        assert_eq!(selected.len(), 5);

        let selected = selector.select(Vec::new(), Some(&REFERENCE), 0.5, &mut rng);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_lower_half_too_small_backfills_disjointly() {
        // pool 7, all explore: lower half holds 4, two more come from ranks 2 and 1
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(11);

        let selected = selector.select(pool(7, &mut rng), Some(&REFERENCE), 1.0, &mut rng);
        let mut ranks: Vec<_> = selected.iter().map(|c| c.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_exploit_and_explore_never_overlap() {
        // pool 8, ratio 0.25: exploit takes 0..5, explore must start at 5
        let selector = CandidateSelector::new(6);
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..50 {
            let selected = selector.select(pool(8, &mut rng), Some(&REFERENCE), 0.25, &mut rng);
            let ranks: HashSet<_> = selected.iter().map(|c| c.rank).collect();
            assert_eq!(ranks.len(), 6);
            assert!((0..5).all(|r| ranks.contains(&r)));
        }
    }

    #[test]
    fn test_without_reference_keeps_provider_order() {
        let selector = CandidateSelector::new(3);
        let mut rng = StdRng::seed_from_u64(0);
        let items: Vec<Item> = ["c", "a", "d", "b"]
            .iter()
            .map(|id| Item::new(*id, "", ""))
            .collect();

        let selected = selector.select(items, None, 0.5, &mut rng);
        let ids: Vec<_> = selected.iter().map(|c| c.item.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "d"]);
    }

    #[test]
    fn test_seeded_selection_is_reproducible() {
        let selector = CandidateSelector::new(6);
        let items = pool(20, &mut StdRng::seed_from_u64(8));

        let run = |seed| {
            selector
                .select(items.clone(), Some(&REFERENCE), 0.5, &mut StdRng::seed_from_u64(seed))
                .into_iter()
                .map(|c| c.item.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
