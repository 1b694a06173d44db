use anyhow::Result;
use heapstore::access::{Column, DataType, Schema, Tuple, Value};
use heapstore::catalog::TableId;
use heapstore::config::StorageConfig;
use heapstore::database::Database;
use heapstore::storage::page::{HeapPage, Page, PageId, Permission};
use heapstore::storage::StorageError;
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const PAGE_SIZE: usize = 64;
/// 4-byte tuples on 64-byte pages
const ROWS_PER_PAGE: usize = 15;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open(max_pages: usize) -> Result<(TempDir, Arc<Database>, TableId)> {
    init_logging();
    let dir = tempdir()?;
    let db = Database::open(dir.path(), StorageConfig::new(PAGE_SIZE, max_pages))?;
    let table_id = db.create_table("t", Schema::new(vec![Column::new("v", DataType::Int32)]))?;
    Ok((dir, Arc::new(db), table_id))
}

fn insert_committed(db: &Database, table_id: TableId, values: impl IntoIterator<Item = i32>) -> Result<()> {
    let txn = db.begin();
    for v in values {
        txn.insert(table_id, vec![Value::Int32(v)])?;
    }
    txn.commit()?;
    Ok(())
}

fn scan_values(db: &Database, table_id: TableId) -> Result<Vec<i32>> {
    let txn = db.begin();
    let mut values = Vec::new();
    for tuple in txn.scan(table_id)? {
        match tuple?.values() {
            [Value::Int32(v)] => values.push(*v),
            other => anyhow::bail!("unexpected row {:?}", other),
        }
    }
    txn.commit()?;
    Ok(values)
}

#[test]
fn test_commit_forces_dirty_pages() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    let file = db.catalog().heap_file(table_id)?;

    // Enough rows to dirty two pages
    let txn = db.begin();
    let id = txn.id();
    for v in 0..(ROWS_PER_PAGE as i32 + 1) {
        txn.insert(table_id, vec![Value::Int32(v)])?;
    }
    let dirty = db.buffer_pool().dirty_pages(id);
    assert_eq!(dirty.len(), 2);
    txn.commit()?;

    for page_id in dirty {
        let cached = db
            .buffer_pool()
            .cached_page(page_id)
            .ok_or_else(|| anyhow::anyhow!("{} dropped from cache", page_id))?;
        assert_eq!(cached.is_dirty(), None);
        assert_eq!(file.read_page(page_id)?.data(), cached.data());
    }

    Ok(())
}

#[test]
fn test_abort_restores_before_images() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, 0..5)?;

    let page_id = PageId::new(table_id, 0);
    let file = db.catalog().heap_file(table_id)?;
    let before = file.read_page(page_id)?;

    let txn = db.begin();
    let id = txn.id();
    txn.insert(table_id, vec![Value::Int32(100)])?;
    let mut first = txn
        .scan(table_id)?
        .next()
        .ok_or_else(|| anyhow::anyhow!("table is empty"))??;
    txn.delete(&mut first)?;
    txn.abort()?;

    assert!(db.buffer_pool().dirty_pages(id).is_empty());
    let cached = db
        .buffer_pool()
        .cached_page(page_id)
        .ok_or_else(|| anyhow::anyhow!("page dropped from cache"))?;
    assert_eq!(cached.is_dirty(), None);
    assert_eq!(cached.data(), before.data());
    assert_eq!(scan_values(&db, table_id)?, vec![0, 1, 2, 3, 4]);

    Ok(())
}

#[test]
fn test_dirty_page_blocks_eviction() -> Result<()> {
    let (_dir, db, table_id) = open(1)?;
    // Two full pages. A one-page pool can only hold one dirty page, so the
    // second page is filled one row per transaction.
    insert_committed(&db, table_id, 0..ROWS_PER_PAGE as i32)?;
    for v in 100..100 + ROWS_PER_PAGE as i32 {
        insert_committed(&db, table_id, [v])?;
    }
    let page_a = PageId::new(table_id, 0);
    let page_b = PageId::new(table_id, 1);

    // T1 dirties page A
    let t1 = db.begin();
    let mut tuple = t1
        .scan(table_id)?
        .next()
        .ok_or_else(|| anyhow::anyhow!("table is empty"))??;
    assert_eq!(tuple.record_id().map(|r| r.page_id), Some(page_a));
    t1.delete(&mut tuple)?;
    assert_eq!(db.buffer_pool().dirty_pages(t1.id()), vec![page_a]);

    // T2 needs page B, but the only cached page is dirty
    let t2 = db.begin();
    let result = t2.fetch_page(page_b, Permission::ReadOnly);
    assert!(matches!(result, Err(StorageError::BufferPoolFull { capacity: 1 })));
    assert!(db.buffer_pool().is_cached(page_a));
    assert!(!db.buffer_pool().is_cached(page_b));

    t1.commit()?;
    t2.fetch_page(page_b, Permission::ReadOnly)?;
    t2.commit()?;

    Ok(())
}

#[test]
fn test_insert_reuses_free_slot() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, 0..(2 * ROWS_PER_PAGE) as i32)?;
    let file = db.catalog().heap_file(table_id)?;
    assert_eq!(file.num_pages()?, 2);

    // Free one slot on the first page
    let txn = db.begin();
    let mut tuple = txn
        .scan(table_id)?
        .nth(3)
        .ok_or_else(|| anyhow::anyhow!("row 3 missing"))??;
    let freed = tuple.record_id().ok_or_else(|| anyhow::anyhow!("no record id"))?;
    txn.delete(&mut tuple)?;
    txn.commit()?;

    let txn = db.begin();
    let mut tuple = Tuple::new(vec![Value::Int32(-1)]);
    let pages = file.insert_tuple(db.buffer_pool(), txn.id(), &mut tuple)?;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id(), freed.page_id);
    assert_eq!(tuple.record_id(), Some(freed));
    assert_eq!(file.num_pages()?, 2);

    Ok(())
}

#[test]
fn test_insert_into_full_file_appends_one_page() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, 0..ROWS_PER_PAGE as i32)?;
    let file = db.catalog().heap_file(table_id)?;
    assert_eq!(file.num_pages()?, 1);

    let txn = db.begin();
    let record_id = txn.insert(table_id, vec![Value::Int32(99)])?;
    assert_eq!(record_id.page_id, PageId::new(table_id, 1));
    assert_eq!(file.num_pages()?, 2);
    txn.commit()?;

    let mut expected: Vec<i32> = (0..ROWS_PER_PAGE as i32).collect();
    expected.push(99);
    assert_eq!(scan_values(&db, table_id)?, expected);

    Ok(())
}

#[test]
fn test_page_round_trip() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    let file = db.catalog().heap_file(table_id)?;

    let mut page = Page::empty(PageId::new(table_id, 0), PAGE_SIZE);
    {
        let mut heap_page = HeapPage::new(page.data_mut(), 4);
        heap_page.insert_tuple(&[0, 0, 0, 7]);
        heap_page.insert_tuple(&[0, 0, 1, 0]);
    }
    file.write_page(&page)?;

    assert_eq!(file.read_page(page.id())?.data(), page.data());
    assert_eq!(scan_values(&db, table_id)?, vec![7, 256]);

    Ok(())
}

#[test]
fn test_empty_table_scan() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    assert_eq!(db.catalog().heap_file(table_id)?.num_pages()?, 0);

    let txn = db.begin();
    let mut scan = txn.scan(table_id)?;
    assert!(scan.next().is_none());
    scan.rewind();
    assert!(scan.next().is_none());

    Ok(())
}

#[test]
fn test_upgrade_from_sole_shared_lock() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, [1])?;
    let page_id = PageId::new(table_id, 0);

    let txn = db.begin();
    txn.fetch_page(page_id, Permission::ReadOnly)?;
    assert!(db.lock_manager().holds_shared(page_id, txn.id()));

    txn.fetch_page(page_id, Permission::ReadWrite)?;
    assert!(db.lock_manager().holds_exclusive(page_id, txn.id()));
    let (exclusive, shared) = db.lock_manager().holders(page_id);
    assert_eq!(exclusive, Some(txn.id()));
    assert!(shared.is_empty());

    Ok(())
}

#[test]
fn test_writer_waits_for_readers() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, [1])?;
    let page_id = PageId::new(table_id, 0);

    let reader = db.begin();
    reader.fetch_page(page_id, Permission::ReadOnly)?;

    let writer_db = Arc::clone(&db);
    let writer = thread::spawn(move || -> Result<()> {
        let txn = writer_db.begin();
        txn.fetch_page(page_id, Permission::ReadWrite)?;
        let (exclusive, shared) = writer_db.lock_manager().holders(page_id);
        assert_eq!(exclusive, Some(txn.id()));
        assert!(shared.is_empty());
        txn.commit()?;
        Ok(())
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!writer.is_finished());
    let (exclusive, shared) = db.lock_manager().holders(page_id);
    assert_eq!(exclusive, None);
    assert_eq!(shared, vec![reader.id()]);

    reader.commit()?;
    writer
        .join()
        .map_err(|_| anyhow::anyhow!("writer panicked"))??;

    Ok(())
}

#[test]
fn test_crossing_writers_deadlock_one_aborts() -> Result<()> {
    let (_dir, db, table_id) = open(10)?;
    insert_committed(&db, table_id, 0..(2 * ROWS_PER_PAGE) as i32)?;
    let page_a = PageId::new(table_id, 0);
    let page_b = PageId::new(table_id, 1);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [(page_a, page_b), (page_b, page_a)]
        .into_iter()
        .map(|(mine, theirs)| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<bool> {
                let txn = db.begin();
                txn.fetch_page(mine, Permission::ReadWrite)?;
                barrier.wait();

                match txn.fetch_page(theirs, Permission::ReadWrite) {
                    Ok(_) => {
                        txn.commit()?;
                        Ok(true)
                    }
                    Err(e) if e.is_abort() => {
                        txn.abort()?;
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))??,
        );
    }

    assert_eq!(outcomes.iter().filter(|&&committed| committed).count(), 1);
    for page_id in [page_a, page_b] {
        assert_eq!(db.lock_manager().holders(page_id), (None, vec![]));
    }

    Ok(())
}

#[test]
fn test_concurrent_inserts_all_land() -> Result<()> {
    let (_dir, db, table_id) = open(50)?;
    const THREADS: i32 = 4;
    const ROWS: i32 = 40;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || -> Result<()> {
                let mut rng = rand::thread_rng();
                for i in 0..ROWS {
                    let value = t * 1000 + i;
                    loop {
                        let txn = db.begin();
                        match txn.insert(table_id, vec![Value::Int32(value)]) {
                            Ok(_) => {
                                txn.commit()?;
                                break;
                            }
                            Err(e) if e.is_abort() => {
                                txn.abort()?;
                                thread::sleep(Duration::from_micros(rng.gen_range(0..500)));
                            }
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

    let mut values = scan_values(&db, table_id)?;
    values.sort_unstable();
    let mut expected: Vec<i32> = (0..THREADS)
        .flat_map(|t| (0..ROWS).map(move |i| t * 1000 + i))
        .collect();
    expected.sort_unstable();
    assert_eq!(values, expected);

    Ok(())
}
