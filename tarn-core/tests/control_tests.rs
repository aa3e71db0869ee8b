//! 控制流：循环、迭代器、try / test、defer、安全级别

mod common;
use common::{ints, run_code, top_bool, top_int, top_str};
use tarn_core::ErrorKind;

// ===== 循环 =====

#[test]
fn test_for_over_count() {
    assert_eq!(top_int(&run_code("0 5 {+} for").unwrap()), Some(10));
}

#[test]
fn test_for_over_list_and_string() {
    assert_eq!(top_int(&run_code("0 [1 2 3] {+} for").unwrap()), Some(6));
    assert_eq!(top_int(&run_code("0 'abc' {drop 1 +} for").unwrap()), Some(3));
}

#[test]
fn test_while_runs_body_first() {
    assert_eq!(ints(&run_code("0 {1 + dup 3 <} while").unwrap()), vec![3]);
    assert_eq!(ints(&run_code("5 {1 + false} while").unwrap()), vec![6]);
}

#[test]
fn test_break() {
    let stack = run_code("0 10 {+ dup 6 > {break} {} if} for").unwrap();
    assert_eq!(ints(&stack), vec![10]);
}

#[test]
fn test_break_outer_loop() {
    let src = "0 3 { drop 3 { drop 1 + dup 4 > {break1} {} if } for } for";
    assert_eq!(ints(&run_code(src).unwrap()), vec![5]);
}

#[test]
fn test_nested_loops() {
    let src = "0 3 { drop 4 { drop 1 + } for } for";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(12));
}

#[test]
fn test_loop_runs_again_after_error() {
    let src = "try: 3 {'x' raise} for ; drop 0 3 {+} for";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(3));
    let src = "try: 1 {'x' raise true} while ; drop 0 {1 + dup 2 <} while";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(2));
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(run_code("break").unwrap_err().kind, ErrorKind::UnknownLabel);
}

// ===== 迭代器 =====

#[test]
fn test_iterator_exhaustion() {
    let stack = run_code("[1 2] iter next swap next swap next").unwrap();
    assert_eq!(stack.len(), 4);
    assert_eq!(ints(&stack[..2]), vec![1, 2]);
    assert!(stack[3].is_nil());
}

#[test]
fn test_range_filter_map() {
    let stack = run_code("0 6 range {2 mod 0 =} filter {dup *} map list").unwrap();
    let items = stack.last().unwrap().as_list().unwrap();
    assert_eq!(ints(&items), vec![0, 4, 16]);
}

#[test]
fn test_zip_to_table() {
    let stack = run_code("['a' 'b'] [1 2] zip table dup len swap 'b' get").unwrap();
    assert_eq!(ints(&stack), vec![2, 2]);
}

#[test]
fn test_rand_is_bounded() {
    let stack = run_code("0 10 range 10 rand zip list").unwrap();
    let pairs = stack.last().unwrap().as_list().unwrap();
    assert_eq!(pairs.len(), 10);
    let stack = run_code("3 rand next swap drop").unwrap();
    let n = top_int(&stack).unwrap();
    assert!((0..3).contains(&n));
}

#[test]
fn test_list_mutation() {
    assert_eq!(top_int(&run_code("[1 2] 3 push len").unwrap()), Some(3));
    assert_eq!(ints(&run_code("[1 2] pop swap drop").unwrap()), vec![2]);
    assert_eq!(top_int(&run_code("[1 2] 0 9 put 0 get").unwrap()), Some(9));
    assert_eq!(
        run_code("[1 2] 5 get").unwrap_err().kind,
        ErrorKind::IndexOutOfBounds
    );
}

#[test]
fn test_container_updates_keep_the_container() {
    let stack = run_code("['a'] [1] zip table 'b' 2 put dup len swap 'b' get").unwrap();
    assert_eq!(ints(&stack), vec![2, 2]);
    let stack = run_code("[] pop").unwrap();
    assert_eq!(stack.len(), 2);
    assert!(stack[1].is_nil());
}

#[test]
fn test_pairs() {
    assert_eq!(ints(&run_code("1 2 pair dup left swap right").unwrap()), vec![1, 2]);
}

// ===== try / test / errors =====

#[test]
fn test_try_success_pushes_nil() {
    let stack = run_code("try: 1 2 + ;").unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].as_i64(), Some(3));
    assert!(stack[1].is_nil());
}

#[test]
fn test_try_collects_error() {
    let stack = run_code("try: 'boom' raise 1 ; 0 get error-message").unwrap();
    assert_eq!(top_str(&stack).as_deref(), Some("boom"));
    let stack = run_code("try: 'boom' raise ; 0 get error-kind #user =").unwrap();
    assert_eq!(top_bool(&stack), Some(true));
}

#[test]
fn test_uncaught_raise() {
    let err = run_code("'boom' raise").unwrap_err();
    assert_eq!(err.kind, ErrorKind::User);
    assert_eq!(err.message, "boom");
}

#[test]
fn test_reraise() {
    let err = run_code("try: 'inner' raise ; 0 get raise").unwrap_err();
    assert_eq!(err.kind, ErrorKind::User);
    assert_eq!(err.message, "inner");
}

#[test]
fn test_try_recovers_inside_lambda() {
    let stack = run_code("try: {1 nope} call ; 0 get error-kind").unwrap();
    assert_eq!(stack.last().unwrap().as_sym().map(|s| &**s), Some("unknown-id"));
}

#[test]
fn test_test_macro() {
    assert!(run_code("test: 'math' 1 1 = ;").unwrap().is_empty());
    let err = run_code("test: 'math' 1 2 = ;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TestFailed);
    assert!(err.message.starts_with("math"));
}

#[test]
fn test_failed_tests_are_collected() {
    let stack = run_code("try: test: 'a' false ; test: 'b' false ; errors len ; len").unwrap();
    assert_eq!(ints(&stack), vec![2, 2]);
}

#[test]
fn test_clear_errors() {
    let stack = run_code("try: test: 'a' false ; #test-failed clear-errors ;").unwrap();
    assert_eq!(stack[0].as_i64(), Some(1));
    assert!(stack[1].is_nil());
    assert_eq!(
        run_code("#no-such-kind clear-errors").unwrap_err().kind,
        ErrorKind::UnknownId
    );
}

// ===== defer =====

#[test]
fn test_defer_runs_at_scope_exit_in_reverse() {
    let src = "let: log []; ( defer: $log 1 push ; defer: $log 2 push ; 0 ) drop $log";
    let stack = run_code(src).unwrap();
    let items = stack.last().unwrap().as_list().unwrap();
    assert_eq!(ints(&items), vec![2, 1]);
}

#[test]
fn test_defer_runs_on_error() {
    let src = "let: log []; try: ( defer: $log 1 push ; 'x' raise ) ; drop $log len";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(1));
}

// ===== 安全级别 =====

#[test]
fn test_unsafe_words_need_unsafe_scope() {
    let err = run_code("'/nonexistent' 'r' open").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsafeCall);
    let err = run_code("unsafe: '/nonexistent/tarn' 'r' open ;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
}
