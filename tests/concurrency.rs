mod common;

use std::thread;

use common::{fresh, get, pattern, put, release};
use xv6fs::{FsError, OpenFlags, Xv6Fs};

#[test]
fn parallel_writers_in_separate_files() {
    let (fs, _) = fresh();
    let root = fs.root();
    fs.mkdir(&root, "/w").unwrap();

    thread::scope(|s| {
        for t in 0..4u8 {
            let (fs, root) = (&fs, &root);
            s.spawn(move || {
                for round in 0..3u8 {
                    let path = format!("/w/t{}-{}", t, round);
                    let data = pattern(2500 + 100 * t as usize, t ^ round);
                    put(fs, root, &path, &data);
                    assert_eq!(get(fs, root, &path), data);
                }
            });
        }
    });

    assert_eq!(fs.readdir(&root, "/w").unwrap().len(), 2 + 12);
    assert_eq!(fs.log().outstanding(), 0);
    assert_eq!(fs.log().pending(), 0);
    release(&fs, root);
}

#[test]
fn shared_descriptor_appends_do_not_interleave_within_a_chunk() {
    let (fs, _) = fresh();
    let root = fs.root();
    let fd = fs
        .open(&root, "/shared", OpenFlags::CREATE | OpenFlags::RDWR)
        .unwrap();

    thread::scope(|s| {
        for t in 0..4u8 {
            let fd = fs.dup(&fd);
            let fs = &fs;
            s.spawn(move || {
                for _ in 0..8 {
                    assert_eq!(fs.write(&fd, &[b'a' + t; 64]).unwrap(), 64);
                }
                fs.close(fd);
            });
        }
    });
    fs.close(fd);

    let data = get(&fs, &root, "/shared");
    assert_eq!(data.len(), 4 * 8 * 64);
    for record in data.chunks(64) {
        assert!(record.iter().all(|&b| b == record[0]));
    }
    release(&fs, root);
}

#[test]
fn directory_updates_from_many_threads() {
    let (fs, _) = fresh();
    let root = fs.root();

    thread::scope(|s| {
        for t in 0..4 {
            let (fs, root) = (&fs, &root);
            s.spawn(move || {
                let dir = format!("/d{}", t);
                fs.mkdir(root, &dir).unwrap();
                for i in 0..5 {
                    put(fs, root, &format!("{}/f{}", dir, i), b"x");
                }
                for i in 0..5 {
                    fs.unlink(root, &format!("{}/f{}", dir, i)).unwrap();
                }
                fs.unlink(root, &dir).unwrap();
            });
        }
    });

    assert_eq!(fs.readdir(&root, "/").unwrap().len(), 2);
    assert_eq!(fs.stat(&root, "/").unwrap().nlink, 1);
    release(&fs, root);
}

fn blocks_in_use(fs: &Xv6Fs) -> usize {
    let sb = fs.superblock();
    (sb.data_start()..sb.size)
        .filter(|&b| fs.block_in_use(b))
        .count()
}

#[test]
fn create_unlink_and_stat_race_on_one_name() {
    let (fs, _) = fresh();
    let root = fs.root();
    fs.mkdir(&root, "/d").unwrap();
    let used = blocks_in_use(&fs);

    thread::scope(|s| {
        for t in 0..6u8 {
            let (fs, root) = (&fs, &root);
            s.spawn(move || {
                let data = pattern(600, t);
                for i in 0..150 {
                    match (i + t as usize) % 3 {
                        0 => put(fs, root, "/d/x", &data),
                        1 => match fs.unlink(root, "/d/x") {
                            Ok(()) | Err(FsError::NotFound) => {}
                            Err(e) => panic!("unlink: {:?}", e),
                        },
                        _ => match fs.stat(root, "/d/x") {
                            Ok(_) | Err(FsError::NotFound) => {}
                            Err(e) => panic!("stat: {:?}", e),
                        },
                    }
                }
            });
        }
    });

    match fs.unlink(&root, "/d/x") {
        Ok(()) | Err(FsError::NotFound) => {}
        Err(e) => panic!("unlink: {:?}", e),
    }
    assert_eq!(fs.readdir(&root, "/d").unwrap().len(), 2);
    assert_eq!(fs.log().outstanding(), 0);
    // every unlinked copy of "x" gave its blocks back
    assert_eq!(blocks_in_use(&fs), used);
    fs.unlink(&root, "/d").unwrap();
    release(&fs, root);
}
