use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;

pub const GAUSS_SIGMA: f64 = 2.5;

// Picks one of the choices with probability proportional to its weight. Returns None only
// when every weight is zero.
pub fn weighted_choice<T: Copy, R: Rng>(choices: &[(T, u32)], rng: &mut R) -> Option<T> {
    let dist = WeightedIndex::new(choices.iter().map(|&(_, w)| w)).ok()?;
    Some(choices[dist.sample(rng)].0)
}

// Random count in [0, n], small values being much more likely than large ones.
pub fn rand_gauss_bounds<R: Rng>(n: usize, rng: &mut R) -> usize {
    let normal = match Normal::new(0.0, GAUSS_SIGMA) {
        Ok(d) => d,
        Err(_) => return 0,
    };
    let x: f64 = normal.sample(rng);
    usize::min(x.abs().round() as usize, n)
}

pub fn choose_index<R: Rng>(len: usize, rng: &mut R) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(rng.gen_range(0..len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_gauss_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        for n in 0..6 {
            for _ in 0..200 {
                assert!(rand_gauss_bounds(n, &mut rng) <= n);
            }
        }
    }

    #[test]
    fn test_weighted_choice_skips_zero_weights() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(weighted_choice(&[("a", 0), ("b", 3), ("c", 0)], &mut rng), Some("b"));
        }
        assert_eq!(weighted_choice(&[("a", 0)], &mut rng), None);
        assert_eq!(choose_index(0, &mut rng), None);
    }
}
