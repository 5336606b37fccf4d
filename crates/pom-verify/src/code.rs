//! One-time verification codes
use rand::rngs::OsRng;
use rand::Rng;

/// Upper-case letters and digits without the look-alikes 0/O, 1/I/L.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: usize,
}

impl CodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Draws every character from the operating system RNG.
    pub fn generate(&self) -> String {
        let mut rng = OsRng;
        (0..self.length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    pub fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.length && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_code_shape() {
        let generator = CodeGenerator::new(8);
        for _ in 0..100 {
            let code = generator.generate();
            assert_eq!(code.len(), 8);
            assert!(generator.is_well_formed(&code), "bad code {}", code);
            assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
        }
    }

    #[test]
    fn test_codes_do_not_repeat() {
        let generator = CodeGenerator::default();
        let codes: HashSet<String> = (0..200).map(|_| generator.generate()).collect();
        // 31^6 possibilities; a collision in 200 draws would point at a broken RNG
        assert_eq!(codes.len(), 200);
    }

    #[test]
    fn test_well_formed() {
        let generator = CodeGenerator::new(5);
        assert!(generator.is_well_formed("XJ4K9"));
        assert!(!generator.is_well_formed("XJ4K"));
        assert!(!generator.is_well_formed("xj4k9"));
        assert!(!generator.is_well_formed("XJ0K9"));
    }
}
