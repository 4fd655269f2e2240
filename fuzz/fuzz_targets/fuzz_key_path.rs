#![no_main]

use libfuzzer_sys::fuzz_target;
use regwatch::KeyPath;

fuzz_target!(|data: (&str, &str)| {
    let (text, child) = data;

    let Ok(path) = KeyPath::parse(text) else {
        return;
    };

    // Display output always parses again under the same root
    let reparsed = KeyPath::parse(&path.to_string()).expect("displayed path must parse");
    assert_eq!(reparsed.root(), path.root());
    let _ = reparsed.cache_key();

    // Joining never loses the root
    let joined = path.join(child);
    assert_eq!(joined.root(), path.root());
    let _ = joined.cache_key();
});
