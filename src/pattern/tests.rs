// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use indoc::indoc;

use super::*;

#[test]
fn test_builtin_patterns() {
    let table = PatternTable::builtin();
    assert_eq!(
        table.names().collect::<Vec<_>>(),
        vec!["LINEAR", "LINEAR-HI", "CIRCULAR", "CIRCULAR-HI", "ALL-STOKES"]
    );

    let linear = table.get("linear").unwrap();
    assert_eq!(linear.kind, PatternKind::Linear);
    assert_eq!(linear.num_stokes, 3);
    assert_eq!(linear.num_pairs(), 2);
    assert_eq!(linear.pair_index(WaveplateCode::new(2, 6)), Some(1));
    assert_eq!(linear.pair_index(WaveplateCode::new(1, 5)), None);

    let linear_hi = table.get("LINEAR-HI").unwrap();
    assert_eq!(linear_hi.kind, PatternKind::LinearHi);
    for (i, code) in [(0, 4), (1, 5), (2, 6), (3, 7)].into_iter().enumerate() {
        assert_eq!(
            linear_hi.pair_index(WaveplateCode::new(code.0, code.1)),
            Some(i)
        );
    }

    for name in ["CIRCULAR", "CIRCULAR-HI", "ALL-STOKES"] {
        assert_eq!(table.get(name).unwrap().kind, PatternKind::Unsupported);
    }
    assert!(table.get("ELLIPTICAL").is_none());
}

#[test]
fn test_pair_codes_are_sorted() {
    let table = PatternTable::parse("LINEAR 3 4 2 6 0 4 # reversed\n").unwrap();
    assert_eq!(
        table.get("LINEAR").unwrap().pair_codes,
        vec![WaveplateCode::new(0, 4), WaveplateCode::new(2, 6)]
    );
}

#[test]
fn test_custom_patterns() {
    let table = PatternTable::parse(indoc! {"
        # A table with an extra pattern.
        LINEAR     3 4  0 4  2 6
        FANCY      3 6  0 4  1 5  2 6
    "})
    .unwrap();
    let fancy = table.get("fancy").unwrap();
    assert_eq!(fancy.kind, PatternKind::Unsupported);
    assert_eq!(fancy.num_pairs(), 3);
}

#[test]
fn test_bad_pattern_tables() {
    assert!(matches!(
        PatternTable::parse("LINEAR 3\n"),
        Err(PatternError::Parse { line: 1, .. })
    ));
    assert!(matches!(
        PatternTable::parse("\nLINEAR 3 6 0 4 2 6\n"),
        Err(PatternError::Parse { line: 2, .. })
    ));
    assert!(matches!(
        PatternTable::parse("LINEAR x 4 0 4 2 6\n"),
        Err(PatternError::Parse { .. })
    ));
    assert!(matches!(
        PatternTable::parse("LINEAR 3 4 0 4 2 16\n"),
        Err(PatternError::Parse { .. })
    ));
    assert!(matches!(
        PatternTable::parse("LINEAR-HI 3 4 0 4 2 6\n"),
        Err(PatternError::PairCount {
            expected: 4,
            got: 2,
            ..
        })
    ));
}
