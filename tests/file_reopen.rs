// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! On-disk scenarios exercised against a real file rather than an
//! in-memory `Cursor`, so the terminal-chain-rediscovery path in
//! `FileWriter::open` actually walks bytes that went through the
//! filesystem.

use std::fs::OpenOptions;
use std::sync::Arc;

use rand::Rng;
use tempfile::tempdir;

use string_db::{Database, FileDatabase, FileDatabaseOptions, StringHandler};

fn open_at(path: &std::path::Path) -> FileDatabase<String, String, std::fs::File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap();
    let options = FileDatabaseOptions::new(Arc::new(StringHandler), Arc::new(StringHandler));
    FileDatabase::open(file, options).unwrap()
}

#[test]
fn reopening_a_file_rediscovers_the_terminal_chunk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.sdb");

    {
        let db = open_at(&path);
        db.insert("a".to_string(), "1".to_string()).unwrap();
        db.insert("b".to_string(), "2".to_string()).unwrap();
        db.dispose().unwrap();
    }

    // A fresh `FileWriter` must walk the chain from offset zero to find
    // the chunk it can still append after, since nothing on disk records
    // "where did we leave off" besides the chain itself.
    let db = open_at(&path);
    db.insert("c".to_string(), "3".to_string()).unwrap();

    let keys: Vec<_> = db.enumerate().unwrap().map(|kv| kv.unwrap().key).collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(db.get(&"a".to_string()).unwrap(), "1");
    assert_eq!(db.get(&"c".to_string()).unwrap(), "3");
}

#[test]
fn reopening_an_empty_file_starts_a_fresh_chain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.sdb");

    // Create the (empty) file up front, as `spec.md` §5's lifecycle
    // section describes: "a stream or file (file created if absent)".
    OpenOptions::new()
        .write(true)
        .create(true)
        .open(&path)
        .unwrap();

    let db = open_at(&path);
    db.insert("only".to_string(), "value".to_string()).unwrap();
    assert_eq!(db.get(&"only".to_string()).unwrap(), "value");
}

#[test]
fn random_batches_round_trip_through_a_real_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("random.sdb");
    let db = open_at(&path);

    let mut rng = rand::thread_rng();
    let mut expected = Vec::new();
    for batch in 0..20 {
        let batch_len = rng.gen_range(1..5);
        let mut pairs = Vec::with_capacity(batch_len);
        for i in 0..batch_len {
            let key = format!("k{batch}-{i}");
            let value_len = rng.gen_range(0..64);
            let value: String = (0..value_len)
                .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                .collect();
            pairs.push((key.clone(), value.clone()));
            expected.push((key, value));
        }
        db.insert_range(pairs).unwrap();
    }

    let got: Vec<(String, String)> = db
        .enumerate()
        .unwrap()
        .map(|kv| {
            let kv = kv.unwrap();
            let value = kv.value.load().unwrap();
            (kv.key, value)
        })
        .collect();
    assert_eq!(got, expected);

    for (key, value) in &expected {
        assert_eq!(&db.get(key).unwrap(), value);
    }
}
