
use std::{
    sync::{mpsc, Arc, Barrier},
    thread,
    time::Duration,
};

use tempfile::tempdir;

use crate::{
    error::DbError,
    lock_manager::LockMode,
    page,
    page_id::PageId,
    tuple,
    tuple::{Tuple, Value},
};

use self::test_utils::{init_logging, test_db, two_int_schema};

#[test]
fn test_committed_inserts_are_visible() {
    init_logging();
    let td = tempdir().unwrap();
    let db = test_db(&td, 256, 8);
    let file = db.create_table("t", two_int_schema()).unwrap();

    let writer = db.begin();
    for i in 0..50 {
        writer.insert_tuple(file.id(), &mut tuple![i, i]).unwrap();
    }
    writer.commit().unwrap();

    let aborted = db.begin();
    for i in 50..60 {
        aborted.insert_tuple(file.id(), &mut tuple![i, i]).unwrap();
    }
    aborted.abort().unwrap();

    let reader = db.begin();
    let scanned: Vec<Tuple> = file
        .iterator(db.buffer_pool(), reader.id())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(scanned.len(), 50);
    assert!(scanned
        .iter()
        .all(|t| matches!(t.get(0), Some(Value::Int(i)) if *i < 50)));
}

#[test]
fn test_writer_blocks_reader_until_commit() {
    init_logging();
    let td = tempdir().unwrap();
    let db = test_db(&td, 256, 8);
    let file = db.create_table("t", two_int_schema()).unwrap();

    let writer = db.begin();
    let mut t = tuple![1, 2];
    writer.insert_tuple(file.id(), &mut t).unwrap();
    let pid = t.record_id().unwrap().page_id();

    let (send, recv) = mpsc::channel();
    let handle = thread::spawn({
        let pool = db.buffer_pool();
        move || {
            let reader = crate::transaction::Transaction::new(pool);
            // blocks until the writer commits
            let page = reader.get_page(pid, LockMode::Shared).unwrap();
            let tuples = page::read(&page).tuples();
            send.send(tuples).unwrap();
            drop(page);
            reader.commit().unwrap();
        }
    });

    thread::sleep(Duration::from_millis(50));
    assert!(recv.try_recv().is_err());
    writer.commit().unwrap();

    assert_eq!(recv.recv().unwrap(), vec![t]);
    handle.join().unwrap();
}

#[test]
fn test_crossed_page_locks_deadlock() {
    init_logging();
    let td = tempdir().unwrap();
    let db = test_db(&td, 256, 8);
    let file = db.create_table("t", two_int_schema()).unwrap();
    file.append_empty_page().unwrap();
    file.append_empty_page().unwrap();
    let (p, q) = (PageId::new(file.id(), 0), PageId::new(file.id(), 1));

    let barrier = Arc::new(Barrier::new(2));
    let run = |first: PageId, second: PageId| {
        let pool = db.buffer_pool();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let tx = crate::transaction::Transaction::new(pool);
            tx.get_page(first, LockMode::Exclusive).unwrap();
            barrier.wait();
            match tx.get_page(second, LockMode::Exclusive) {
                Ok(_) => {
                    tx.commit().unwrap();
                    Ok(())
                }
                Err(e) => {
                    tx.abort().unwrap();
                    Err(e)
                }
            }
        })
    };

    let t1 = run(p, q);
    let t2 = run(q, p);
    let results = [t1.join().unwrap(), t2.join().unwrap()];

    // the transaction that closes the cycle aborts and the other one finishes
    let deadlocked = results
        .iter()
        .filter(|r| matches!(r, Err(DbError::Deadlock { .. })))
        .count();
    assert!(deadlocked >= 1);
    assert!(results.iter().all(|r| r.is_ok() || matches!(r, Err(e) if e.is_abort())));
    assert!(db.lock_manager().holders(p).is_empty());
    assert!(db.lock_manager().holders(q).is_empty());
}

#[test]
fn test_second_waiter_sees_deadlock() {
    let td = tempdir().unwrap();
    let db = test_db(&td, 256, 8);
    let lm = db.lock_manager();
    let (t1, t2) = (db.begin(), db.begin());
    let (p, q) = (PageId::new(1, 0), PageId::new(1, 1));

    assert!(lm.request_exclusive(t1.id(), p));
    assert!(lm.request_exclusive(t2.id(), q));

    // t1 waits for q: no cycle yet
    assert!(!lm.request_exclusive(t1.id(), q));
    assert!(!lm.detect_deadlock(t1.id(), q));

    // t2 waiting for p closes the cycle
    assert!(!lm.request_exclusive(t2.id(), p));
    assert!(lm.detect_deadlock(t2.id(), p));
}

#[test]
fn test_concurrent_inserts() {
    init_logging();
    let td = tempdir().unwrap();
    let db = test_db(&td, 4096, 16);
    let file = db.create_table("t", two_int_schema()).unwrap();

    let threads = 4;
    let per_thread = 100;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads as i32)
        .map(|n| {
            let pool = db.buffer_pool();
            let barrier = barrier.clone();
            let table_id = file.id();
            thread::spawn(move || {
                barrier.wait();
                // retry until the transaction gets through without a deadlock
                loop {
                    let tx = crate::transaction::Transaction::new(pool.clone());
                    let res = (0..per_thread)
                        .try_for_each(|i| tx.insert_tuple(table_id, &mut tuple![n, i]));
                    match res {
                        Ok(()) => break tx.commit().unwrap(),
                        Err(e) if e.is_abort() => tx.abort().unwrap(),
                        Err(e) => panic!("insert failed: {}", e),
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let reader = db.begin();
    let mut scanned: Vec<Vec<Value>> = file
        .iterator(db.buffer_pool(), reader.id())
        .map(|t| t.unwrap().values().to_vec())
        .collect();
    scanned.sort_by_key(|v| format!("{:?}", v));
    scanned.dedup();
    assert_eq!(scanned.len(), threads * per_thread as usize);
}
