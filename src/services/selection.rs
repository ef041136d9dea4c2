//! Deterministic reviewer selection.
//!
//! Candidates are ranked by the SHA-256 digest of the ranking key (the PR id)
//! followed by the candidate id, smallest digest first. The ranking depends
//! only on its inputs, so the same key, pool and exclusion set always produce
//! the same ordered result, across calls and across restarts.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::store::{StoreError, StoreUnit};

/// Reviewers assigned to a newly created pull request.
pub const REVIEWERS_PER_PR: usize = 2;

/// Rank of `candidate` under `key`.
pub fn rank(key: &str, candidate: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(candidate.as_bytes());
    hasher.finalize().into()
}

/// Choose up to `count` candidates from `pool`, skipping anything in `exclude`.
///
/// Returns fewer than `count` (possibly none) when the pool is too small;
/// callers decide what that means. Duplicates in `pool` are collapsed.
pub fn select_candidates<S: AsRef<str>>(
    key: &str,
    pool: &[S],
    exclude: &HashSet<String>,
    count: usize,
) -> Vec<String> {
    let mut ranked: Vec<([u8; 32], &str)> = pool
        .iter()
        .map(|id| id.as_ref())
        .filter(|id| !exclude.contains(*id))
        .map(|id| (rank(key, id), id))
        .collect();

    ranked.sort_unstable();
    ranked.dedup_by(|a, b| a.1 == b.1);

    ranked
        .into_iter()
        .take(count)
        .map(|(_, id)| id.to_string())
        .collect()
}

/// Pick up to `count` active members of `team_name` for the PR `key`,
/// reading the pool through the caller's atomic unit.
pub async fn pick_reviewers<U: StoreUnit>(
    unit: &mut U,
    key: &str,
    team_name: &str,
    exclude: &HashSet<String>,
    count: usize,
) -> Result<Vec<String>, StoreError> {
    let pool = unit.active_team_members(team_name).await?;
    Ok(select_candidates(key, &pool, exclude, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_same_inputs_same_result() {
        let pool = ["u2", "u3", "u4", "u5", "u6"];
        let first = select_candidates("pr-1", &pool, &excluded(&["u1"]), 2);
        for _ in 0..10 {
            assert_eq!(select_candidates("pr-1", &pool, &excluded(&["u1"]), 2), first);
        }
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_pool_order_does_not_matter() {
        let forward = ["u2", "u3", "u4", "u5"];
        let reversed = ["u5", "u4", "u3", "u2"];
        assert_eq!(
            select_candidates("pr-7", &forward, &HashSet::new(), 3),
            select_candidates("pr-7", &reversed, &HashSet::new(), 3)
        );
    }

    #[test]
    fn test_exclusions_never_selected() {
        let pool = ["u1", "u2", "u3"];
        let picked = select_candidates("pr-1", &pool, &excluded(&["u1", "u3"]), 2);
        assert_eq!(picked, vec!["u2"]);
    }

    #[test]
    fn test_small_pool_returns_fewer() {
        let pool: [&str; 0] = [];
        assert!(select_candidates("pr-1", &pool, &HashSet::new(), 2).is_empty());

        let pool = ["u2"];
        assert_eq!(select_candidates("pr-1", &pool, &HashSet::new(), 2), vec!["u2"]);
    }

    #[test]
    fn test_result_follows_rank_order() {
        let pool = ["a", "b", "c", "d", "e", "f"];
        let picked = select_candidates("pr-9", &pool, &HashSet::new(), pool.len());
        let ranks: Vec<[u8; 32]> = picked.iter().map(|id| rank("pr-9", id)).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicates_collapsed() {
        let pool = ["u2", "u2", "u3"];
        let picked = select_candidates("pr-1", &pool, &HashSet::new(), 3);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_key_changes_ranking_somewhere() {
        let pool: Vec<String> = (0..20).map(|i| format!("u{}", i)).collect();
        let distinct: HashSet<Vec<String>> = (0..10)
            .map(|k| select_candidates(&format!("pr-{}", k), &pool, &HashSet::new(), 2))
            .collect();
        assert!(distinct.len() > 1);
    }
}
