//! Longest common substring primitives.
//!
//! Both functions return only the length of the longest contiguous run shared
//! by the two inputs, never the run itself.

use std::collections::HashMap;
use std::hash::Hash;

/// Longest common substring over arbitrary token slices.
///
/// Classic O(n·m) dynamic programming with two rolling rows, so memory is
/// O(m) regardless of the target length.
pub fn longest_common_substring<T: PartialEq>(target: &[T], candidate: &[T]) -> usize {
    let m = candidate.len();
    if target.is_empty() || m == 0 {
        return 0;
    }

    let mut rows = [vec![0usize; m + 1], vec![0usize; m + 1]];
    let mut best = 0;
    for i in 1..=target.len() {
        let cur = i % 2;
        let prev = 1 - cur;
        for j in 1..=m {
            let run = if target[i - 1] == candidate[j - 1] {
                rows[prev][j - 1] + 1
            } else {
                0
            };
            rows[cur][j] = run;
            best = best.max(run);
        }
    }
    best
}

#[derive(Debug, Clone)]
struct State<T> {
    len: usize,
    link: Option<usize>,
    next: HashMap<T, usize>,
}

impl<T> State<T> {
    fn new(len: usize) -> Self {
        Self {
            len,
            link: None,
            next: HashMap::new(),
        }
    }
}

/// Suffix automaton of a sequence, for linear-time substring matching.
///
/// Building is O(n) in the indexed sequence and each query is O(m) in the
/// queried one, against O(n·m) for the table-based formulation.
#[derive(Debug, Clone)]
pub struct SuffixAutomaton<T> {
    states: Vec<State<T>>,
    last: usize,
}

impl<T: Copy + Eq + Hash> SuffixAutomaton<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut automaton = Self {
            states: vec![State::new(0)],
            last: 0,
        };
        for item in items {
            automaton.extend(item);
        }
        automaton
    }

    fn extend(&mut self, c: T) {
        let cur = self.states.len();
        self.states.push(State::new(self.states[self.last].len + 1));

        let mut p = Some(self.last);
        while let Some(pi) = p {
            if self.states[pi].next.contains_key(&c) {
                break;
            }
            self.states[pi].next.insert(c, cur);
            p = self.states[pi].link;
        }

        let link = match p {
            None => 0,
            Some(pi) => match self.states[pi].next.get(&c).copied() {
                Some(q) if self.states[pi].len + 1 == self.states[q].len => q,
                Some(q) => self.split(pi, q, c),
                None => 0,
            },
        };
        self.states[cur].link = Some(link);
        self.last = cur;
    }

    /// Clone `q` so that the transition on `c` from `p` becomes solid.
    fn split(&mut self, p: usize, q: usize, c: T) -> usize {
        let clone = self.states.len();
        let mut cloned = State::new(self.states[p].len + 1);
        cloned.link = self.states[q].link;
        cloned.next = self.states[q].next.clone();
        self.states.push(cloned);

        let mut walk = Some(p);
        while let Some(pi) = walk {
            if self.states[pi].next.get(&c) != Some(&q) {
                break;
            }
            self.states[pi].next.insert(c, clone);
            walk = self.states[pi].link;
        }
        self.states[q].link = Some(clone);
        clone
    }

    /// Length of the longest run of `other` that also occurs in the indexed
    /// sequence.
    pub fn longest_common_substring(&self, other: impl IntoIterator<Item = T>) -> usize {
        let mut state = 0;
        let mut len = 0;
        let mut best = 0;
        for c in other {
            while state != 0 && !self.states[state].next.contains_key(&c) {
                state = self.states[state].link.unwrap_or(0);
                len = self.states[state].len;
            }
            if let Some(&next) = self.states[state].next.get(&c) {
                state = next;
                len += 1;
            }
            best = best.max(len);
        }
        best
    }
}

/// Longest common substring through a suffix automaton of `target`.
///
/// Same result as [`longest_common_substring`] in linear time; items must
/// be cheap to copy, so callers intern larger tokens first.
pub fn longest_common_substring_linear<T>(target: &[T], candidate: &[T]) -> usize
where
    T: Copy + Eq + Hash,
{
    if target.is_empty() || candidate.is_empty() {
        return 0;
    }
    SuffixAutomaton::new(target.iter().copied())
        .longest_common_substring(candidate.iter().copied())
}
