//! Initial passwords for new users

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::config::{CharClass, ImportConfig};
use crate::{Error, Result};

/// Random password generator
///
/// Draws from the configured character classes minus the excluded
/// characters. Every mandatory class gets at least one character as long as
/// the length permits, and at most `length / 5` characters are special.
pub struct PasswordGenerator {
    length: usize,
    classes: Vec<(CharClass, Vec<char>)>,
    mandatory: Vec<CharClass>,
    rng: Mutex<StdRng>,
}

impl PasswordGenerator {
    /// Build a generator from the run configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` if the length is 0 or no non-special characters remain.
    pub fn new(settings: &ImportConfig) -> Result<Self> {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Deterministic generator for tests
    pub fn with_seed(settings: &ImportConfig, seed: u64) -> Result<Self> {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: &ImportConfig, rng: StdRng) -> Result<Self> {
        let length = settings.password_length();
        if length == 0 {
            return Err(Error::config("password length must not be 0"));
        }

        let exclude = &settings.password.exclude;
        let mut classes: Vec<(CharClass, Vec<char>)> = Vec::new();
        for class in &settings.password.classes {
            if classes.iter().any(|(c, _)| c == class) {
                continue;
            }
            let chars: Vec<char> = class
                .alphabet()
                .chars()
                .filter(|c| !exclude.contains(*c))
                .collect();
            if !chars.is_empty() {
                classes.push((*class, chars));
            }
        }

        if !classes.iter().any(|(c, _)| *c != CharClass::Special) {
            return Err(Error::config(
                "password classes leave no non-special characters",
            ));
        }

        let mandatory = settings
            .password
            .mandatory_classes
            .iter()
            .filter(|m| classes.iter().any(|(c, _)| c == *m))
            .copied()
            .collect();

        Ok(Self {
            length,
            classes,
            mandatory,
            rng: Mutex::new(rng),
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    fn alphabet(&self, class: CharClass) -> Option<&[char]> {
        self.classes
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, chars)| chars.as_slice())
    }

    /// Generate one password
    pub fn generate(&self) -> String {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let max_special = self.length / 5;
        let mut specials = 0;
        let mut password: Vec<char> = Vec::with_capacity(self.length);

        for class in &self.mandatory {
            if password.len() >= self.length {
                break;
            }
            if *class == CharClass::Special && specials >= max_special {
                continue;
            }
            if let Some(&c) = self.alphabet(*class).and_then(|a| a.choose(&mut *rng)) {
                password.push(c);
                if *class == CharClass::Special {
                    specials += 1;
                }
            }
        }

        let regular: Vec<char> = self
            .classes
            .iter()
            .filter(|(c, _)| *c != CharClass::Special)
            .flat_map(|(_, chars)| chars.iter().copied())
            .collect();
        let special = self.alphabet(CharClass::Special).unwrap_or(&[]);

        while password.len() < self.length {
            let total = regular.len() + special.len();
            let pick = rng.gen_range(0..total);
            if pick >= regular.len() && specials < max_special {
                password.push(special[pick - regular.len()]);
                specials += 1;
            } else {
                password.push(regular[pick % regular.len()]);
            }
        }

        password.shuffle(&mut *rng);
        password.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(length: usize) -> ImportConfig {
        let mut settings = ImportConfig::default();
        settings.password.length = length;
        settings
    }

    fn count(password: &str, class: CharClass) -> usize {
        password
            .chars()
            .filter(|c| class.alphabet().contains(*c))
            .count()
    }

    #[test]
    fn test_length_and_classes() {
        let generator = PasswordGenerator::with_seed(&settings(15), 7).unwrap();
        for _ in 0..50 {
            let password = generator.generate();
            assert_eq!(password.chars().count(), 15);
            assert!(count(&password, CharClass::Lower) >= 1);
            assert!(count(&password, CharClass::Upper) >= 1);
            assert!(count(&password, CharClass::Digit) >= 1);
            assert!(count(&password, CharClass::Special) <= 3);
        }
    }

    #[test]
    fn test_excluded_characters_never_appear() {
        let generator = PasswordGenerator::with_seed(&settings(40), 1).unwrap();
        let exclude = ImportConfig::default().password.exclude;
        for _ in 0..20 {
            let password = generator.generate();
            assert!(!password.chars().any(|c| exclude.contains(c)));
        }
    }

    #[test]
    fn test_short_passwords_have_no_specials() {
        let generator = PasswordGenerator::with_seed(&settings(4), 3).unwrap();
        for _ in 0..20 {
            assert_eq!(count(&generator.generate(), CharClass::Special), 0);
        }
    }

    #[test]
    fn test_mandatory_limited_by_length() {
        let generator = PasswordGenerator::with_seed(&settings(2), 3).unwrap();
        assert_eq!(generator.generate().chars().count(), 2);
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            PasswordGenerator::new(&settings(0)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_policy_overrides_length() {
        let mut settings = settings(8);
        settings.password_policy = Some(crate::config::PasswordPolicy { min_length: 12 });
        let generator = PasswordGenerator::with_seed(&settings, 9).unwrap();
        assert_eq!(generator.generate().chars().count(), 12);
    }
}
