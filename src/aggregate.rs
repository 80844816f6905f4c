/// Combine per-tracker seeder counts into one count per info hash by taking
/// the largest value any tracker reported.  A tracker that reported nothing
/// is expected to have contributed all zeros.
///
/// Every element of `results` must have length `len`.
pub(crate) fn max_seeders(len: usize, results: &[Vec<u32>]) -> Vec<u32> {
    let mut best = vec![0; len];
    for seeders in results {
        debug_assert_eq!(seeders.len(), len, "misaligned tracker result");
        for (b, &s) in best.iter_mut().zip(seeders) {
            *b = (*b).max(s);
        }
    }
    best
}
