use super::candidates::{Candidate, NestedCandidates};

/// Weight of a candidate's own penalty, divided by its confidence.
pub const CONFIDENCE_WEIGHT: f32 = 0.4;

fn own_penalty(candidate: &Candidate) -> f32 {
    CONFIDENCE_WEIGHT / candidate.confidence.max(1) as f32
}

fn transition_cost(from: f32, to: f32) -> f32 {
    (from / to).log2().abs()
}

/// Pick one fundamental per window by minimum total cost.
///
/// The forward pass stores each candidate's path cost and best predecessor,
/// then every run of non-empty windows is traced back from its cheapest
/// final candidate. Windows without candidates yield `NaN` and break the
/// path. Costs are recomputed from scratch on every call.
pub fn select_candidates(candidates: &mut NestedCandidates) -> Vec<f32> {
    let windows = candidates.windows_mut();

    for t in 0..windows.len() {
        let (done, rest) = windows.split_at_mut(t);
        let previous = done.last().map(Vec::as_slice).unwrap_or(&[]);
        for cand in rest[0].iter_mut() {
            let best = previous
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.cost + transition_cost(p.frequency, cand.frequency)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let (predecessor, path) = match best {
                Some((i, cost)) => (Some(i), cost),
                None => (None, 0.0),
            };
            cand.cost = own_penalty(cand) + path;
            cand.best_predecessor = predecessor;
        }
    }

    let mut pitches = vec![f32::NAN; windows.len()];
    let mut t = windows.len();
    while t > 0 {
        t -= 1;
        let cheapest = windows[t]
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cost.total_cmp(&b.1.cost))
            .map(|(i, _)| i);
        let Some(mut index) = cheapest else {
            continue;
        };
        // walk this run back to its first window
        loop {
            let cand = windows[t][index];
            pitches[t] = cand.frequency;
            match cand.best_predecessor {
                Some(prev) if t > 0 => {
                    t -= 1;
                    index = prev;
                }
                _ => break,
            }
        }
    }
    pitches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(entries: &[(f32, u32)]) -> Vec<Candidate> {
        entries.iter().map(|&(f, c)| Candidate::new(f, c)).collect()
    }

    #[test]
    fn prefers_continuous_path() {
        let mut nested = NestedCandidates::new(vec![
            window(&[(200.0, 3)]),
            window(&[(100.0, 4), (202.0, 3)]),
            window(&[(201.0, 3)]),
        ]);
        let pitches = select_candidates(&mut nested);
        assert_eq!(pitches, vec![200.0, 202.0, 201.0]);
    }

    #[test]
    fn confidence_breaks_ties_within_a_window() {
        let mut nested = NestedCandidates::new(vec![window(&[(150.0, 1), (300.0, 5)])]);
        assert_eq!(select_candidates(&mut nested), vec![300.0]);
    }

    #[test]
    fn empty_windows_are_nan_and_split_paths() {
        let mut nested = NestedCandidates::new(vec![
            window(&[(220.0, 2)]),
            Vec::new(),
            window(&[(440.0, 2), (110.0, 1)]),
        ]);
        let pitches = select_candidates(&mut nested);
        assert_eq!(pitches[0], 220.0);
        assert!(pitches[1].is_nan());
        assert_eq!(pitches[2], 440.0);
        assert_eq!(nested.window(2)[0].best_predecessor, None);
    }

    #[test]
    fn records_predecessors() {
        let mut nested = NestedCandidates::new(vec![
            window(&[(100.0, 2), (300.0, 2)]),
            window(&[(290.0, 2)]),
        ]);
        select_candidates(&mut nested);
        assert_eq!(nested.window(1)[0].best_predecessor, Some(1));
        assert!(nested.window(1)[0].cost > nested.window(0)[1].cost);
    }

    #[test]
    fn selection_is_idempotent() {
        let mut nested = NestedCandidates::new(vec![
            window(&[(110.0, 2), (220.0, 3)]),
            window(&[(225.0, 2), (450.0, 1)]),
            Vec::new(),
            window(&[(330.0, 4)]),
            window(&[(160.0, 2), (335.0, 1)]),
        ]);
        let first = select_candidates(&mut nested);
        let snapshot = nested.clone();
        let second = select_candidates(&mut nested);
        assert_eq!(nested, snapshot);
        for (a, b) in first.iter().zip(&second) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn empty_sequence_gives_empty_output() {
        let mut nested = NestedCandidates::default();
        assert!(select_candidates(&mut nested).is_empty());
    }
}
