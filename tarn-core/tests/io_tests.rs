//! 文件、目录与轮询迭代器

mod common;
use common::{quoted, run_code, top_int, top_str};
use tarn_core::ErrorKind;

#[test]
fn test_write_then_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let path = quoted(&path.to_string_lossy());

    run_code(&format!("unsafe: {path} 'w' open 'hello ' write 42 write drop ;")).unwrap();
    let stack = run_code(&format!("unsafe: {path} 'r' open read-iter list 0 get str ;")).unwrap();
    assert_eq!(top_str(&stack).as_deref(), Some("hello 42"));
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello 42");
}

#[test]
fn test_append_mode() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("log.txt");
    std::fs::write(&file, "a").unwrap();
    let path = quoted(&file.to_string_lossy());
    run_code(&format!("unsafe: {path} 'a' open 'b' bin write drop ;")).unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "ab");
}

#[test]
fn test_read_iter_chunks_large_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("big.bin");
    std::fs::write(&file, vec![7u8; 10_000]).unwrap();
    let path = quoted(&file.to_string_lossy());
    let stack = run_code(&format!(
        "unsafe: 0 {path} 'r' open read-iter {{len +}} for ;"
    ))
    .unwrap();
    assert_eq!(top_int(&stack), Some(10_000));
}

#[test]
fn test_bad_file_mode() {
    let err = run_code("unsafe: '/tmp' 'x' open ;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadLiteral);
}

#[test]
fn test_dir_lists_entries() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "1").unwrap();
    std::fs::write(dir.path().join("b.txt"), "2").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("c.txt"), "3").unwrap();
    let path = quoted(&dir.path().to_string_lossy());

    let stack = run_code(&format!("unsafe: {path} dir list len ;")).unwrap();
    assert_eq!(top_int(&stack), Some(3));
    let stack = run_code(&format!("unsafe: {path} rdir list len ;")).unwrap();
    assert_eq!(top_int(&stack), Some(4));
}

#[test]
fn test_dir_on_file_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = quoted(&file.path().to_string_lossy());
    let err = run_code(&format!("unsafe: {path} dir ;")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
}

#[test]
fn test_poll_drains_all_sources() {
    let stack = run_code("[[1 2] [3] 0 0 range] poll list").unwrap();
    let items = stack.last().unwrap().as_list().unwrap();
    let mut ints: Vec<i64> = items.iter().filter_map(|v| v.as_i64()).collect();
    ints.sort();
    assert_eq!(ints, vec![1, 2, 3]);
}
