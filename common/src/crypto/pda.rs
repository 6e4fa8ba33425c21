// Program derived addresses
//
// An address derived from a program id and a list of seeds. The derivation must
// match the executing environment bit for bit:
//   sha256(seed_0 || .. || seed_n || bump || program_id || PDA_MARKER)
// and the resulting 32 bytes must not be a valid ed25519 point.

use curve25519_dalek::edwards::CompressedEdwardsY;
use log::trace;

use super::{hashv, CryptoError, Pubkey};

pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8; 21] = b"ProgramDerivedAddress";

// Check if the given bytes decompress into a point of the ed25519 curve
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

fn check_seeds(seeds: &[&[u8]], reserved: usize) -> Result<(), CryptoError> {
    if seeds.len() + reserved > MAX_SEEDS {
        return Err(CryptoError::TooManySeeds {
            count: seeds.len() + reserved,
            max: MAX_SEEDS,
        });
    }

    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(CryptoError::SeedTooLong {
                index,
                len: seed.len(),
                max: MAX_SEED_LEN,
            });
        }
    }

    Ok(())
}

/// Derive an address from exact seeds, the bump (if any) must already be part of them.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<Pubkey, CryptoError> {
    check_seeds(seeds, 0)?;

    let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 2);
    parts.extend_from_slice(seeds);
    parts.push(program_id.as_ref());
    parts.push(PDA_MARKER);

    let hash = hashv(&parts).to_bytes();
    if is_on_curve(&hash) {
        return Err(CryptoError::OnCurve);
    }

    Ok(Pubkey::new(hash))
}

/// Find the canonical derived address, searching the bump seed from 255 down to 0.
///
/// Returns the address with the bump that produced it.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), CryptoError> {
    // one slot is reserved for the bump
    check_seeds(seeds, 1)?;

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump = seeds.to_vec();
        with_bump.push(&bump_seed);
        let result = create_program_address(&with_bump, program_id);

        match result {
            Ok(address) => {
                if log::log_enabled!(log::Level::Trace) {
                    trace!("derived {} with bump {} under {}", address, bump, program_id);
                }
                return Ok((address, bump));
            }
            Err(CryptoError::OnCurve) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(CryptoError::NoViableBump)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Pubkey {
        Pubkey::new([42u8; 32])
    }

    #[test]
    fn test_find_is_deterministic() {
        let a = find_program_address(&[b"task", &[1, 0]], &program()).unwrap();
        let b = find_program_address(&[b"task", &[1, 0]], &program()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_found_address_is_off_curve_and_matches_bump() {
        let (address, bump) = find_program_address(&[b"user", &[9u8; 32]], &program()).unwrap();
        assert!(!is_on_curve(address.as_bytes()));
        let recreated =
            create_program_address(&[b"user", &[9u8; 32], &[bump]], &program()).unwrap();
        assert_eq!(address, recreated);
    }

    #[test]
    fn test_different_seeds_give_different_addresses() {
        let (a, _) = find_program_address(&[b"task", &0u16.to_le_bytes()], &program()).unwrap();
        let (b, _) = find_program_address(&[b"task", &1u16.to_le_bytes()], &program()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seed_limits() {
        let long = [0u8; MAX_SEED_LEN + 1];
        assert!(matches!(
            find_program_address(&[&long], &program()),
            Err(CryptoError::SeedTooLong { index: 0, .. })
        ));

        let seeds: Vec<&[u8]> = vec![b"x"; MAX_SEEDS];
        assert!(matches!(
            find_program_address(&seeds, &program()),
            Err(CryptoError::TooManySeeds { .. })
        ));
    }

    #[test]
    fn test_basepoint_is_on_curve() {
        // compressed ed25519 base point
        let mut basepoint = [0x66u8; 32];
        basepoint[0] = 0x58;
        assert!(is_on_curve(&basepoint));
    }
}
