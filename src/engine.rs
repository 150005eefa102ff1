//! Partition-parallel collections.
//!
//! A [Dataset] is a collection split into partitions. Every transformation runs independently
//! per partition on a [Substrate]; results that depend on all partitions are combined with an
//! associative function, in partition order. The correctness of the reductions built on top of
//! this module depends only on that contract, not on the substrate that executes it.

use std::hash::Hash;

use bytes::Bytes;
use hashbrown::HashMap;
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::ReductionError;

/// Execution substrate for partition-parallel work.
pub trait Substrate: Clone + Send + Sync + 'static {
    /// Apply `f` to every partition, passing its index. Results are returned in partition order.
    fn map_partitions<T, U, F>(&self, partitions: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(usize, T) -> U + Send + Sync;

    /// Run two independent computations, potentially concurrently.
    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send;
}

/// Runs every partition in turn on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

impl Substrate for Sequential {
    fn map_partitions<T, U, F>(&self, partitions: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(usize, T) -> U + Send + Sync,
    {
        partitions
            .into_iter()
            .enumerate()
            .map(|(index, partition)| f(index, partition))
            .collect()
    }

    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        (a(), b())
    }
}

/// Runs partitions on the current Rayon thread pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rayon;

impl Rayon {
    /// Configure the global Rayon thread pool.
    ///
    /// # Arguments
    ///
    /// * `threads`: Optional number of worker threads. Defaults to the number of CPUs.
    pub fn init(threads: Option<usize>) -> Result<Self, ReductionError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("worker-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        builder.build_global()?;
        Ok(Rayon)
    }
}

impl Substrate for Rayon {
    fn map_partitions<T, U, F>(&self, partitions: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(usize, T) -> U + Send + Sync,
    {
        partitions
            .into_par_iter()
            .enumerate()
            .map(|(index, partition)| f(index, partition))
            .collect()
    }

    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(a, b)
    }
}

/// A partitioned collection of `T` executed on substrate `S`.
#[derive(Clone, Debug)]
pub struct Dataset<T, S> {
    partitions: Vec<Vec<T>>,
    substrate: S,
}

impl<T, S> Dataset<T, S>
where
    T: Send + Sync,
    S: Substrate,
{
    /// Build a dataset from explicit partitions.
    pub fn from_partitions(partitions: Vec<Vec<T>>, substrate: S) -> Self {
        Dataset {
            partitions,
            substrate,
        }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Number of elements in each partition.
    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Vec::len).collect()
    }

    /// Transform each whole partition.
    pub fn map_partitions<U, F>(self, f: F) -> Dataset<U, S>
    where
        U: Send + Sync,
        F: Fn(usize, Vec<T>) -> Vec<U> + Send + Sync,
    {
        let partitions = self.substrate.map_partitions(self.partitions, f);
        Dataset {
            partitions,
            substrate: self.substrate,
        }
    }

    /// Transform each whole partition, also returning one value per partition. Values are
    /// returned in partition order.
    pub fn map_partitions_with<U, A, F>(self, f: F) -> (Dataset<U, S>, Vec<A>)
    where
        U: Send + Sync,
        A: Send,
        F: Fn(usize, Vec<T>) -> (Vec<U>, A) + Send + Sync,
    {
        let (partitions, values): (Vec<Vec<U>>, Vec<A>) = self
            .substrate
            .map_partitions(self.partitions, f)
            .into_iter()
            .unzip();
        let dataset = Dataset {
            partitions,
            substrate: self.substrate,
        };
        (dataset, values)
    }

    /// Transform each element.
    pub fn map<U, F>(self, f: F) -> Dataset<U, S>
    where
        U: Send + Sync,
        F: Fn(T) -> U + Send + Sync,
    {
        self.map_partitions(|_, partition| partition.into_iter().map(&f).collect())
    }

    /// Keep the elements for which `predicate` holds.
    pub fn filter<F>(self, predicate: F) -> Dataset<T, S>
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.map_partitions(|_, partition| partition.into_iter().filter(&predicate).collect())
    }

    /// Transform each element, dropping those mapped to `None`.
    pub fn filter_map<U, F>(self, f: F) -> Dataset<U, S>
    where
        U: Send + Sync,
        F: Fn(T) -> Option<U> + Send + Sync,
    {
        self.map_partitions(|_, partition| partition.into_iter().filter_map(&f).collect())
    }

    /// Fold every partition from `identity`, then combine the partial results in partition order.
    ///
    /// `combine` must be associative and `identity` its identity element for the result to be
    /// independent of the partitioning.
    pub fn reduce<A, I, F, C>(&self, identity: I, fold: F, combine: C) -> A
    where
        A: Send,
        I: Fn() -> A + Send + Sync,
        F: Fn(A, &T) -> A + Send + Sync,
        C: Fn(A, A) -> A,
    {
        let refs: Vec<&Vec<T>> = self.partitions.iter().collect();
        self.substrate
            .map_partitions(refs, |_, partition| {
                partition.iter().fold(identity(), &fold)
            })
            .into_iter()
            .fold(identity(), combine)
    }

    /// Group by `key` and reduce each group's values with an associative `combine`.
    ///
    /// Each partition builds its own table of partial values, and the tables are merged in
    /// partition order.
    pub fn group_reduce<K, V, FK, FV, C>(&self, key: FK, value: FV, combine: C) -> HashMap<K, V>
    where
        K: Eq + Hash + Send,
        V: Send,
        FK: Fn(&T) -> K + Send + Sync,
        FV: Fn(&T) -> V + Send + Sync,
        C: Fn(V, V) -> V + Send + Sync,
    {
        let merge = |mut table: HashMap<K, V>, k: K, v: V| {
            match table.remove(&k) {
                Some(existing) => table.insert(k, combine(existing, v)),
                None => table.insert(k, v),
            };
            table
        };
        self.reduce(
            HashMap::new,
            |table, element| merge(table, key(element), value(element)),
            |left, right| right.into_iter().fold(left, |table, (k, v)| merge(table, k, v)),
        )
    }

    /// Number of elements across all partitions.
    pub fn count(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Number of elements for which `predicate` holds.
    pub fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool + Send + Sync,
    {
        self.reduce(
            || 0,
            |count, element| count + usize::from(predicate(element)),
            |a, b| a + b,
        )
    }

    /// Bernoulli sample: each element is included independently with probability `fraction`.
    ///
    /// Partition `i` draws from a generator seeded with `seed + i`, so the sample is
    /// deterministic for a fixed seed and partition layout, but not across layouts.
    pub fn sample(&self, fraction: f64, seed: u64) -> Result<Dataset<T, S>, ReductionError>
    where
        T: Clone,
    {
        let bernoulli = Bernoulli::new(fraction)?;
        let refs: Vec<&Vec<T>> = self.partitions.iter().collect();
        let partitions = self.substrate.map_partitions(refs, |index, partition| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            partition
                .iter()
                .filter(|_| bernoulli.sample(&mut rng))
                .cloned()
                .collect()
        });
        Ok(Dataset {
            partitions,
            substrate: self.substrate.clone(),
        })
    }

    /// Materialise all elements, in partition order.
    pub fn collect(self) -> Vec<T> {
        self.partitions.into_iter().flatten().collect()
    }
}

/// Split text into at most `target` partitions of roughly equal size, at line boundaries.
///
/// No line is split across partitions and the partitions concatenate to the input. The slices
/// share the input buffer.
pub fn split_partitions(data: Bytes, target: usize) -> Vec<Bytes> {
    let target = target.max(1);
    let chunk = data.len().div_ceil(target).max(1);
    let mut partitions = Vec::with_capacity(target);
    let mut start = 0;
    while start < data.len() {
        let end = if start + chunk >= data.len() {
            data.len()
        } else {
            // Extend to the end of the line containing the nominal boundary.
            match data[start + chunk - 1..].iter().position(|b| *b == b'\n') {
                Some(offset) => start + chunk + offset,
                None => data.len(),
            }
        };
        partitions.push(data.slice(start..end));
        start = end;
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset<S: Substrate>(partitions: Vec<Vec<i64>>, substrate: S) -> Dataset<i64, S> {
        Dataset::from_partitions(partitions, substrate)
    }

    #[test]
    fn map_filter_collect() {
        let ds = dataset(vec![vec![1, 2, 3], vec![], vec![4, 5]], Sequential);
        let result = ds.map(|x| x * 10).filter(|x| *x > 15).collect();
        assert_eq!(vec![20, 30, 40, 50], result);
    }

    #[test]
    fn map_preserves_partitioning() {
        let ds = dataset(vec![vec![1, 2, 3], vec![], vec![4, 5]], Rayon);
        let ds = ds.map(|x| x + 1);
        assert_eq!(vec![3, 0, 2], ds.partition_sizes());
        assert_eq!(vec![2, 3, 4, 5, 6], ds.collect());
    }

    #[test]
    fn map_partitions_with_returns_values_in_order() {
        let ds = dataset(vec![vec![1, 2, 3], vec![], vec![4, 5]], Sequential);
        let (odd, sums) = ds.map_partitions_with(|index, partition| {
            let sum: i64 = partition.iter().sum();
            let odd: Vec<i64> = partition.into_iter().filter(|x| x % 2 == 1).collect();
            (odd, (index, sum))
        });
        assert_eq!(vec![(0, 6), (1, 0), (2, 9)], sums);
        assert_eq!(vec![2, 0, 1], odd.partition_sizes());
        assert_eq!(vec![1, 3, 5], odd.collect());

        let ds = dataset(vec![vec![1, 2, 3], vec![], vec![4, 5]], Rayon);
        let (_, counts) = ds.map_partitions_with(|_, partition| (Vec::<i64>::new(), partition.len()));
        assert_eq!(vec![3, 0, 2], counts);
    }

    #[test]
    fn filter_map_drops_none() {
        let ds = dataset(vec![vec![1, 2], vec![3, 4]], Sequential);
        let result = ds
            .filter_map(|x| if x % 2 == 0 { Some(x * x) } else { None })
            .collect();
        assert_eq!(vec![4, 16], result);
    }

    #[test]
    fn count_and_count_where() {
        let ds = dataset(vec![vec![1, 2, 3], vec![4], vec![]], Rayon);
        assert_eq!(4, ds.count());
        assert_eq!(2, ds.count_where(|x| x % 2 == 0));
        assert_eq!(3, ds.num_partitions());
    }

    #[test]
    fn reduce_is_partition_invariant() {
        let whole = dataset(vec![(1..=100).collect()], Sequential);
        let split = dataset(
            vec![(1..=10).collect(), vec![], (11..=60).collect(), (61..=100).collect()],
            Rayon,
        );
        fn sum<S: Substrate>(ds: &Dataset<i64, S>) -> i64 {
            ds.reduce(|| 0, |a, x| a + x, |a, b| a + b)
        }
        assert_eq!(5050, sum(&whole));
        assert_eq!(5050, sum(&split));
    }

    #[test]
    fn group_reduce_merges_partitions() {
        let ds = dataset(vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]], Rayon);
        let groups = ds.group_reduce(|x| x % 3, |x| (*x, 1), |a, b| (a.0 + b.0, a.1 + b.1));
        assert_eq!(3, groups.len());
        assert_eq!((3 + 6, 2), groups[&0]);
        assert_eq!((1 + 4 + 7, 3), groups[&1]);
        assert_eq!((2 + 5, 2), groups[&2]);
    }

    #[test]
    fn sample_full_fraction_keeps_everything() {
        let ds = dataset(vec![vec![1, 2, 3], vec![4, 5]], Sequential);
        let sampled = ds.sample(1.0, 7).unwrap();
        assert_eq!(vec![1, 2, 3, 4, 5], sampled.collect());
    }

    #[test]
    fn sample_is_deterministic_for_layout() {
        let partitions: Vec<Vec<i64>> = (0..4).map(|p| (p * 1000..(p + 1) * 1000).collect()).collect();
        let a = dataset(partitions.clone(), Sequential).sample(0.1, 42).unwrap();
        let b = dataset(partitions, Rayon).sample(0.1, 42).unwrap();
        assert_eq!(a.collect(), b.collect());
    }

    #[test]
    fn sample_seed_matters() {
        let partitions: Vec<Vec<i64>> = vec![(0..10_000).collect()];
        let a = dataset(partitions.clone(), Sequential).sample(0.5, 1).unwrap();
        let b = dataset(partitions, Sequential).sample(0.5, 2).unwrap();
        assert_ne!(a.collect(), b.collect());
    }

    #[test]
    fn sample_invalid_fraction() {
        let ds = dataset(vec![vec![1]], Sequential);
        assert!(ds.sample(1.5, 0).is_err());
        assert!(ds.sample(-0.1, 0).is_err());
    }

    #[test]
    fn join_runs_both() {
        for (a, b) in [Sequential.join(|| 1, || "two"), Rayon.join(|| 1, || "two")] {
            assert_eq!(1, a);
            assert_eq!("two", b);
        }
    }

    #[test]
    fn split_partitions_at_line_boundaries() {
        let text = "a,1\nbb,22\nccc,333\ndddd,4444\n";
        let partitions = split_partitions(Bytes::from(text), 3);
        assert!(partitions.len() <= 3);
        let mut joined = Vec::new();
        for partition in &partitions {
            assert!(partition.ends_with(b"\n"), "{:?}", partition);
            joined.extend_from_slice(partition);
        }
        assert_eq!(text.as_bytes(), &joined[..]);
    }

    #[test]
    fn split_partitions_without_trailing_newline() {
        let text = "a\nb\nc";
        let partitions = split_partitions(Bytes::from(text), 2);
        let joined: Vec<u8> = partitions.iter().flat_map(|p| p.iter().copied()).collect();
        assert_eq!(text.as_bytes(), &joined[..]);
    }

    #[test]
    fn split_partitions_edge_cases() {
        assert!(split_partitions(Bytes::new(), 4).is_empty());
        assert_eq!(1, split_partitions(Bytes::from("one line"), 0).len());
        let many = split_partitions(Bytes::from("x\n"), 8);
        assert_eq!(vec![Bytes::from("x\n")], many);
    }
}
