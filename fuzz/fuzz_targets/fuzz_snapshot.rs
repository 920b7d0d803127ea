#![no_main]

use arbitrary::Arbitrary;
use kwix::index::{Entry, Snapshot, Stash};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    entries: Vec<(i8, String)>,
    query: String,
}

fuzz_target!(|input: Input| {
    // Reserved code points are rejected upstream
    let reserved = |s: &str| s.chars().any(|c| matches!(c, '\u{0}' | '\u{10FFFE}' | '\u{10FFFF}'));

    let stash: Stash = input
        .entries
        .into_iter()
        .filter(|(_, content)| !reserved(content))
        .map(|(id, content)| (id as i64, Entry::new(id as i64, content)))
        .collect();
    if reserved(&input.query) {
        return;
    }

    let expected: Vec<i64> = stash
        .values()
        .filter(|entry| entry.content.contains(input.query.as_str()))
        .map(|entry| entry.id)
        .collect();

    let snapshot = Snapshot::build(stash).unwrap();
    let found: Vec<i64> = snapshot.find(&input.query).into_keys().collect();

    assert_eq!(found, expected);
});
