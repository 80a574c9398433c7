//! Random password generation from the OS CSPRNG.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use tracing::warn;

use crate::strength::SPECIAL_CHARS;

pub const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &[u8] = b"0123456789";
pub const SPECIAL: &[u8] = SPECIAL_CHARS.as_bytes();

/// Alphabet used when no class is selected.
pub const DEFAULT_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*(),.?\":{}|<>";

pub const DEFAULT_LENGTH: usize = 12;

/// Largest length accepted from clients.
pub const MAX_LENGTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub length: usize,
    pub include_uppercase: bool,
    pub include_lowercase: bool,
    pub include_digits: bool,
    pub include_special: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            include_uppercase: true,
            include_lowercase: true,
            include_digits: true,
            include_special: true,
        }
    }
}

impl GenerateOptions {
    fn classes(&self) -> Vec<&'static [u8]> {
        [
            (self.include_uppercase, UPPERCASE),
            (self.include_lowercase, LOWERCASE),
            (self.include_digits, DIGITS),
            (self.include_special, SPECIAL),
        ]
        .into_iter()
        .filter_map(|(on, class)| on.then_some(class))
        .collect()
    }

    /// Length of the password that will actually be produced: one character
    /// per selected class at minimum.
    pub fn effective_length(&self) -> usize {
        self.length.max(self.classes().len())
    }
}

/// Generates a password with the given random source.
///
/// One character is drawn from each selected class, the rest uniformly from
/// their union, and the result is shuffled so the seeded characters do not
/// sit at fixed positions.
pub fn generate_with<R>(options: &GenerateOptions, rng: &mut R) -> String
where
    R: Rng + CryptoRng,
{
    let classes = options.classes();
    let pool: Vec<u8> = if classes.is_empty() { DEFAULT_ALPHABET.to_vec() } else { classes.concat() };

    if options.length < classes.len() {
        warn!(
            requested = options.length,
            produced = classes.len(),
            "length below the number of selected classes, password will be longer than requested"
        );
    }

    let mut password = Vec::with_capacity(options.effective_length());
    for class in &classes {
        password.push(class[rng.gen_range(0..class.len())]);
    }
    while password.len() < options.length {
        password.push(pool[rng.gen_range(0..pool.len())]);
    }
    password.shuffle(rng);

    password.into_iter().map(char::from).collect()
}

/// Generates a password from the OS CSPRNG.
pub fn generate(options: &GenerateOptions) -> String {
    generate_with(options, &mut OsRng)
}
