//! Turns recognizer class indices into a formatted label.
//!
//! Layout of a digit sequence:
//! - position 0: guard digit, zero means "not a number"
//! - position 1: layout selector, 3 = plain `DDD`, 4 = hyphenated `DDD-D`
//! - positions 2..: payload digits
//!
//! Class 10 is the rollover zero and reads as digit 0.

use std::fmt;

use crate::error::InferenceError;

/// Number of recognizer output slots.
pub const DIGIT_SLOTS: usize = 6;

/// Class index the recognizer uses for zero.
pub const ROLLOVER_ZERO_CLASS: u8 = 10;

const PLAIN_LAYOUT: u8 = 3;
const HYPHENATED_LAYOUT: u8 = 4;

/// Arg-max class index for each recognizer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitSequence([u8; DIGIT_SLOTS]);

impl DigitSequence {
    pub fn new(classes: [u8; DIGIT_SLOTS]) -> Result<Self, InferenceError> {
        if let Some(class) = classes.iter().find(|&&c| c > ROLLOVER_ZERO_CLASS) {
            return Err(InferenceError::ShapeMismatch(format!(
                "digit class {class} out of range"
            )));
        }
        Ok(Self(classes))
    }

    pub fn classes(&self) -> &[u8; DIGIT_SLOTS] {
        &self.0
    }

    /// Digits with the rollover class folded into 0.
    fn digits(&self) -> [u8; DIGIT_SLOTS] {
        self.0.map(|c| if c == ROLLOVER_ZERO_CLASS { 0 } else { c })
    }
}

impl TryFrom<&[usize]> for DigitSequence {
    type Error = InferenceError;

    fn try_from(classes: &[usize]) -> Result<Self, Self::Error> {
        if classes.len() != DIGIT_SLOTS {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected {} digit slots, got {}",
                DIGIT_SLOTS,
                classes.len()
            )));
        }
        let mut out = [0u8; DIGIT_SLOTS];
        for (slot, &class) in out.iter_mut().zip(classes) {
            *slot = u8::try_from(class).map_err(|_| {
                InferenceError::ShapeMismatch(format!("digit class {class} out of range"))
            })?;
        }
        Self::new(out)
    }
}

/// A decoded label, either `725` or `725-9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_hyphenated(&self) -> bool {
        self.0.contains('-')
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a digit sequence did not yield a label. Routine, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeRejection {
    /// Guard digit was zero
    NotANumber,
    /// Layout selector was neither 3 nor 4
    UnknownLayout(u8),
}

impl fmt::Display for DecodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeRejection::NotANumber => write!(f, "not a number: guard digit is 0"),
            DecodeRejection::UnknownLayout(sel) => write!(f, "unknown layout selector {sel}"),
        }
    }
}

pub fn decode(sequence: &DigitSequence) -> Result<Label, DecodeRejection> {
    let d = sequence.digits();
    if d[0] == 0 {
        return Err(DecodeRejection::NotANumber);
    }

    let payload: String = d[2..5].iter().map(|&v| char::from(b'0' + v)).collect();
    match d[1] {
        PLAIN_LAYOUT => Ok(Label(payload)),
        HYPHENATED_LAYOUT => Ok(Label(format!("{}-{}", payload, d[5]))),
        other => Err(DecodeRejection::UnknownLayout(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(classes: [u8; 6]) -> DigitSequence {
        DigitSequence::new(classes).unwrap()
    }

    #[test]
    fn test_plain_layout() {
        assert_eq!(decode(&seq([5, 3, 7, 2, 5, 1])).unwrap().as_str(), "725");
    }

    #[test]
    fn test_hyphenated_layout() {
        let label = decode(&seq([5, 4, 7, 2, 5, 9])).unwrap();
        assert_eq!(label.as_str(), "725-9");
        assert!(label.is_hyphenated());
    }

    #[test]
    fn test_zero_guard_rejects() {
        assert_eq!(decode(&seq([0, 3, 7, 2, 5, 1])), Err(DecodeRejection::NotANumber));
        // Rollover zero in the guard slot rejects too.
        assert_eq!(decode(&seq([10, 3, 7, 2, 5, 1])), Err(DecodeRejection::NotANumber));
    }

    #[test]
    fn test_unknown_selector_rejects() {
        assert_eq!(
            decode(&seq([5, 9, 7, 2, 5, 1])),
            Err(DecodeRejection::UnknownLayout(9))
        );
        // Selector class 10 folds to 0, which is not a layout.
        assert_eq!(
            decode(&seq([5, 10, 7, 2, 5, 1])),
            Err(DecodeRejection::UnknownLayout(0))
        );
    }

    #[test]
    fn test_rollover_zero_keeps_leading_digit() {
        assert_eq!(decode(&seq([5, 3, 10, 2, 5, 1])).unwrap().as_str(), "025");
        assert_eq!(decode(&seq([5, 4, 0, 0, 10, 10])).unwrap().as_str(), "000-0");
    }

    #[test]
    fn test_decode_is_repeatable() {
        for classes in [[5, 3, 7, 2, 5, 1], [5, 4, 1, 2, 3, 4], [0, 4, 1, 1, 1, 1], [1, 7, 0, 0, 0, 0]] {
            let s = seq(classes);
            assert_eq!(decode(&s), decode(&s));
        }
    }

    #[test]
    fn test_sequence_from_argmax_validates() {
        let ok = DigitSequence::try_from(&[5usize, 3, 7, 2, 5, 1][..]).unwrap();
        assert_eq!(ok.classes(), &[5, 3, 7, 2, 5, 1]);
        assert!(DigitSequence::try_from(&[5usize, 3, 7][..]).is_err());
        assert!(DigitSequence::try_from(&[5usize, 3, 11, 2, 5, 1][..]).is_err());
    }
}
