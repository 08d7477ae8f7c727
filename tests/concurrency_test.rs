use anyhow::Result;
use heapdb::access::{DataType, HeapFile, Tuple, TupleDesc, Value};
use heapdb::concurrency::LockMode;
use heapdb::catalog::TableId;
use heapdb::config::DatabaseConfig;
use heapdb::database::Database;
use heapdb::storage::{HeapPage, PageId, Permissions, StorageError};
use heapdb::transaction::TransactionId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn setup(pages: u32) -> Result<(TempDir, Database, TableId)> {
    let dir = tempdir()?;
    let db = Database::open(
        dir.path(),
        DatabaseConfig {
            page_size: 1024,
            buffer_pool_pages: 16,
        },
    )?;
    let table_id = db.create_table("counters", TupleDesc::new(vec![DataType::Int32]))?;
    let file = db.catalog().lookup(table_id)?;
    for _ in 0..pages {
        file.allocate_page()?;
    }
    Ok((dir, db, table_id))
}

fn insert(
    db: &Database,
    tid: TransactionId,
    table_id: TableId,
    n: i32,
) -> Result<(), StorageError> {
    let desc = db.catalog().tuple_desc(table_id)?;
    let mut tuple = Tuple::from_values(desc, vec![Value::Int32(n)])?;
    db.buffer_pool().insert_tuple(tid, table_id, &mut tuple)
}

#[test]
fn test_shared_holders_block_writer() -> Result<()> {
    let (_dir, db, table_id) = setup(1)?;
    let page_id = PageId::new(table_id, 0);
    let pool = db.buffer_pool();
    let manager = db.transaction_manager();

    let r1 = manager.begin();
    let r2 = manager.begin();
    pool.get_page(r1, page_id, Permissions::ReadOnly)?;
    pool.get_page(r2, page_id, Permissions::ReadOnly)?;
    assert!(pool.holds_lock(r1, page_id));
    assert!(pool.holds_lock(r2, page_id));

    let granted = AtomicBool::new(false);
    thread::scope(|s| -> Result<()> {
        let writer = s.spawn(|| -> Result<()> {
            let w = manager.begin();
            pool.get_page(w, page_id, Permissions::ReadWrite)?;
            granted.store(true, Ordering::SeqCst);
            manager.commit(w)?;
            Ok(())
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!granted.load(Ordering::SeqCst));

        manager.commit(r1)?;
        thread::sleep(Duration::from_millis(100));
        assert!(!granted.load(Ordering::SeqCst));

        manager.commit(r2)?;
        writer
            .join()
            .map_err(|_| anyhow::anyhow!("writer panicked"))??;
        Ok(())
    })?;

    assert!(granted.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_uncommitted_insert_invisible_until_commit() -> Result<()> {
    let (_dir, db, table_id) = setup(0)?;
    let manager = db.transaction_manager();

    let writer = manager.begin();
    insert(&db, writer, table_id, 42)?;

    let seen = thread::scope(|s| -> Result<usize> {
        let reader = s.spawn(|| -> Result<usize> {
            let r = manager.begin();
            let page = db
                .buffer_pool()
                .get_page(r, PageId::new(table_id, 0), Permissions::ReadOnly)?;
            let count = page.read().iter().count();
            manager.commit(r)?;
            Ok(count)
        });

        thread::sleep(Duration::from_millis(100));
        manager.commit(writer)?;
        reader
            .join()
            .map_err(|_| anyhow::anyhow!("reader panicked"))?
    })?;

    assert_eq!(seen, 1);
    Ok(())
}

#[test]
fn test_deadlock_aborts_exactly_one() -> Result<()> {
    let (_dir, db, table_id) = setup(2)?;
    let p0 = PageId::new(table_id, 0);
    let p1 = PageId::new(table_id, 1);
    let barrier = Barrier::new(2);

    let run = |first: PageId, second: PageId| -> Result<bool> {
        let manager = db.transaction_manager();
        let pool = db.buffer_pool();
        let tid = manager.begin();

        pool.get_page(tid, first, Permissions::ReadWrite)?;
        barrier.wait();

        match pool.get_page(tid, second, Permissions::ReadWrite) {
            Ok(_) => {
                manager.commit(tid)?;
                Ok(true)
            }
            Err(e) if e.is_abort() => {
                manager.abort(tid)?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    };

    let (a, b) = thread::scope(|s| {
        let a = s.spawn(|| run(p0, p1));
        let b = s.spawn(|| run(p1, p0));
        (a.join(), b.join())
    });
    let a = a.map_err(|_| anyhow::anyhow!("thread a panicked"))??;
    let b = b.map_err(|_| anyhow::anyhow!("thread b panicked"))??;

    assert!(a ^ b, "exactly one transaction must commit");
    assert_eq!(db.lock_manager().lock_count(), 0);
    Ok(())
}

fn wait_for_pages(file: &HeapFile, pages: u32) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while file.num_pages()? < pages {
        if Instant::now() > deadline {
            anyhow::bail!("file never reached {} pages", pages);
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

#[test]
fn test_insert_moves_on_when_appended_page_is_taken() -> Result<()> {
    let (_dir, db, table_id) = setup(0)?;
    let manager = db.transaction_manager();
    let file = db.catalog().lookup(table_id)?;
    let slots = HeapPage::num_slots_for(1024, file.tuple_desc().byte_size()) as i32;

    let loader = manager.begin();
    for n in 0..slots {
        insert(&db, loader, table_id, n)?;
    }
    manager.commit(loader)?;
    assert_eq!(file.num_pages()?, 1);

    // The rival owns the page the next insert will append.
    let rival = manager.begin();
    let next_page = PageId::new(table_id, 1);
    db.lock_manager().acquire(rival, next_page, LockMode::Exclusive)?;

    let placed = thread::scope(|s| -> Result<Option<PageId>> {
        let appender = s.spawn(|| -> Result<Option<PageId>> {
            let tid = manager.begin();
            let desc = db.catalog().tuple_desc(table_id)?;
            let mut tuple = Tuple::from_values(desc, vec![Value::Int32(-1)])?;
            db.buffer_pool().insert_tuple(tid, table_id, &mut tuple)?;
            manager.commit(tid)?;
            Ok(tuple.record_id().map(|rid| rid.page_id))
        });

        wait_for_pages(&file, 2)?;
        for n in 0..slots {
            insert(&db, rival, table_id, slots + n)?;
        }
        manager.commit(rival)?;

        appender
            .join()
            .map_err(|_| anyhow::anyhow!("appender panicked"))?
    })?;

    assert_eq!(placed, Some(PageId::new(table_id, 2)));
    assert_eq!(file.num_pages()?, 3);
    Ok(())
}

#[test]
fn test_concurrent_inserters_with_retry() -> Result<()> {
    const THREADS: i32 = 4;
    const ROWS: i32 = 50;

    let (_dir, db, table_id) = setup(0)?;
    let manager = db.transaction_manager();

    thread::scope(|s| -> Result<()> {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let db = &db;
                s.spawn(move || -> Result<()> {
                    for i in 0..ROWS {
                        loop {
                            let tid = manager.begin();
                            match insert(db, tid, table_id, t * ROWS + i) {
                                Ok(()) => {
                                    manager.commit(tid)?;
                                    break;
                                }
                                Err(e) if e.is_abort() => manager.abort(tid)?,
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("inserter panicked"))??;
        }
        Ok(())
    })?;

    let reader = manager.begin();
    let file = db.catalog().lookup(table_id)?;
    let mut values = Vec::new();
    for page_no in 0..file.num_pages()? {
        let page = db
            .buffer_pool()
            .get_page(reader, PageId::new(table_id, page_no), Permissions::ReadOnly)?;
        for tuple in page.read().iter() {
            values.push(tuple?.value(0)?.as_i32().unwrap_or(-1));
        }
    }
    manager.commit(reader)?;

    values.sort();
    assert_eq!(values, (0..THREADS * ROWS).collect::<Vec<_>>());
    Ok(())
}
