#![no_main]

// Harness: parse_boundary_state – a hostile or half-written state file must
// surface as a SyncError from initialize, never as a panic, and must never
// be silently treated as a fresh store while the file is present.

use libfuzzer_sys::fuzz_target;
use stampsync::{FileSynchronizer, TimestampSynchronizer};

/// Mirror of the on-disk v1 document, kept in lockstep with the crate's
/// parser so the harness can decide what the outcome must be.
#[derive(serde::Deserialize)]
struct DocMirror {
    version: u32,
    boundary: u64,
}

fuzz_target!(|bytes: &[u8]| {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("boundary.json"), bytes).expect("seed state file");

    let expected = serde_json::from_slice::<DocMirror>(bytes)
        .ok()
        .filter(|doc| doc.version == 1);

    let mut sync = FileSynchronizer::new(dir.path()).expect("open store");
    match (sync.initialize(), expected) {
        (Ok(boundary), Some(doc)) => assert_eq!(boundary, doc.boundary),
        (Err(_), None) => {}
        (Ok(boundary), None) => {
            panic!("invalid document accepted, boundary {boundary}")
        }
        (Err(e), Some(_)) => panic!("valid v1 document rejected: {e}"),
    }
});
