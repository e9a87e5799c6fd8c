use rand::{Rng, RngCore};

/// Source of uniform shuffle indices; `pick(upper)` draws from `0..=upper`.
pub trait IndexSource {
    fn pick(&mut self, upper: usize) -> usize;
}

impl<R: RngCore + ?Sized> IndexSource for R {
    fn pick(&mut self, upper: usize) -> usize {
        self.gen_range(0..=upper)
    }
}

pub fn shuffle_in_place<T, S: IndexSource + ?Sized>(items: &mut [T], source: &mut S) {
    for i in (1..items.len()).rev() {
        let j = source.pick(i);
        debug_assert!(j <= i, "index source returned {j} for upper bound {i}");
        items.swap(i, j.min(i));
    }
}

/// Shuffled copy of `items`; the input is left as is.
pub fn shuffle<T: Clone, S: IndexSource + ?Sized>(items: &[T], source: &mut S) -> Vec<T> {
    let mut out = items.to_vec();
    shuffle_in_place(&mut out, source);
    out
}

pub fn shuffled_indices<S: IndexSource + ?Sized>(n: usize, source: &mut S) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    shuffle_in_place(&mut indices, source);
    indices
}

pub fn is_permutation(perm: &[usize], n: usize) -> bool {
    if perm.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &idx in perm {
        if idx >= n || seen[idx] {
            return false;
        }
        seen[idx] = true;
    }
    true
}

#[cfg(test)]
pub(crate) struct ScriptedSource {
    picks: std::collections::VecDeque<usize>,
}

#[cfg(test)]
impl ScriptedSource {
    pub(crate) fn new(picks: &[usize]) -> Self {
        Self { picks: picks.iter().copied().collect() }
    }
}

#[cfg(test)]
impl IndexSource for ScriptedSource {
    fn pick(&mut self, upper: usize) -> usize {
        self.picks.pop_front().unwrap_or(upper)
    }
}
