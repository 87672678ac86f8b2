use bytes::Bytes;
use lsm::batch::WriteBatch;
use lsm::db::Db;

#[test]
fn put_get_delete_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Db::open(dir.path()).unwrap();
        db.set(b"alpha", b"1").unwrap();
        db.set(b"beta", b"2").unwrap();
        db.delete(b"beta").unwrap();
    }

    let db = Db::open(dir.path()).unwrap();
    assert_eq!(db.get(b"alpha").unwrap(), Some(Bytes::from_static(b"1")));
    assert_eq!(db.get(b"beta").unwrap(), None);
}

#[test]
fn writes_beyond_the_memtable_budget_trigger_flushes_and_stay_readable() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path()).unwrap();

    for i in 0..20_000u32 {
        db.set(format!("k{i:06}").as_bytes(), format!("v{i}").as_bytes())
            .unwrap();
    }

    for i in (0..20_000u32).step_by(997) {
        let key = format!("k{i:06}");
        let expected = format!("v{i}");
        assert_eq!(
            db.get(key.as_bytes()).unwrap(),
            Some(Bytes::from(expected)),
            "missing {key}"
        );
    }
}

#[test]
fn a_batch_is_applied_atomically_with_consecutive_sequence_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path()).unwrap();

    let mut batch = WriteBatch::new();
    batch.set(Bytes::from_static(b"x"), Bytes::from_static(b"1"));
    batch.set(Bytes::from_static(b"y"), Bytes::from_static(b"2"));
    batch.delete(Bytes::from_static(b"x"));
    db.write(batch).unwrap();

    assert_eq!(db.get(b"x").unwrap(), None);
    assert_eq!(db.get(b"y").unwrap(), Some(Bytes::from_static(b"2")));
}

#[test]
fn iteration_is_ascending_deduped_and_tombstone_free() {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path()).unwrap();

    db.set(b"c", b"1").unwrap();
    db.set(b"a", b"1").unwrap();
    db.set(b"b", b"1").unwrap();
    db.set(b"a", b"2").unwrap();
    db.delete(b"b").unwrap();

    let mut it = db.iter().unwrap();
    let mut seen = Vec::new();
    while it.is_valid() {
        seen.push((it.user_key().to_vec(), it.value().to_vec()));
        it.next().unwrap();
    }

    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"1".to_vec()),
        ]
    );
}

#[test]
fn iteration_seeks_and_runs_backward_over_a_flushed_table() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path()).unwrap();

    for i in 0..200u32 {
        db.set(format!("k{i:05}").as_bytes(), format!("v{i}").as_bytes())
            .unwrap();
    }
    db.delete(b"k00100").unwrap();

    let mut it = db.iter().unwrap();
    it.seek(b"k00150").unwrap();
    assert_eq!(it.user_key(), b"k00150");
    assert_eq!(it.value(), b"v150");

    it.seek_to_last().unwrap();
    assert_eq!(it.user_key(), b"k00199");

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(it.user_key().to_vec());
        it.prev().unwrap();
    }
    assert_eq!(
        seen,
        vec![
            b"k00199".to_vec(),
            b"k00198".to_vec(),
            b"k00197".to_vec(),
            b"k00196".to_vec(),
            b"k00195".to_vec(),
        ]
    );

    it.seek(b"k00099").unwrap();
    let mut around_deletion = Vec::new();
    for _ in 0..3 {
        around_deletion.push(it.user_key().to_vec());
        it.next().unwrap();
    }
    assert_eq!(around_deletion, vec![b"k00099".to_vec(), b"k00101".to_vec(), b"k00102".to_vec()]);
}

#[test]
fn heavy_write_volume_compacts_down_through_the_levels() {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(dir.path()).unwrap();

    for round in 0..8u32 {
        for i in 0..5_000u32 {
            let key = format!("round{round:02}-key{i:05}");
            db.set(key.as_bytes(), b"payload-bytes-to-grow-the-table").unwrap();
        }
    }

    // Give the background thread a moment to catch up with L0 pressure;
    // correctness does not depend on compaction having finished, only on
    // every written key still being visible afterward.
    std::thread::sleep(std::time::Duration::from_millis(200));

    assert_eq!(
        db.get(b"round00-key00000").unwrap(),
        Some(Bytes::from_static(b"payload-bytes-to-grow-the-table"))
    );
    assert_eq!(
        db.get(b"round07-key04999").unwrap(),
        Some(Bytes::from_static(b"payload-bytes-to-grow-the-table"))
    );
}
