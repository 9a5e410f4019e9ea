use numlabel::{DecodeRejection, DigitSequence, decode};

fn decode_classes(classes: [u8; 6]) -> Result<String, DecodeRejection> {
    let sequence = DigitSequence::new(classes).expect("classes in range");
    decode(&sequence).map(|label| label.into_string())
}

#[test]
fn test_reference_sequences() {
    assert_eq!(decode_classes([5, 3, 7, 2, 5, 1]), Ok("725".to_string()));
    assert_eq!(decode_classes([5, 4, 7, 2, 5, 9]), Ok("725-9".to_string()));
    assert_eq!(decode_classes([0, 3, 7, 2, 5, 1]), Err(DecodeRejection::NotANumber));
    assert_eq!(decode_classes([5, 9, 7, 2, 5, 1]), Err(DecodeRejection::UnknownLayout(9)));
    assert_eq!(decode_classes([5, 3, 10, 2, 5, 1]), Ok("025".to_string()));
}

#[test]
fn test_rollover_class_matches_zero_everywhere() {
    let base = [5, 4, 1, 2, 3, 4];
    for position in 0..6 {
        let mut with_zero = base;
        let mut with_rollover = base;
        with_zero[position] = 0;
        with_rollover[position] = 10;
        assert_eq!(decode_classes(with_zero), decode_classes(with_rollover));
    }
}

#[test]
fn test_every_selector_other_than_three_or_four_rejects() {
    for selector in 0..=10u8 {
        let result = decode_classes([1, selector, 1, 2, 3, 4]);
        match selector {
            3 => assert_eq!(result, Ok("123".to_string())),
            4 => assert_eq!(result, Ok("123-4".to_string())),
            10 => assert_eq!(result, Err(DecodeRejection::UnknownLayout(0))),
            other => assert_eq!(result, Err(DecodeRejection::UnknownLayout(other))),
        }
    }
}
