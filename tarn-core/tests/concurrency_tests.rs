//! 协程、fiber 与 OS 线程

mod common;
use common::{ints, run_code, top_int};
use std::time::Duration;
use tarn_core::{Engine, ErrorKind};

// ===== 协程 =====

#[test]
fn test_lambda_yield_resumes() {
    let stack = run_code("let: g {1 yield 2}; $g call $g call").unwrap();
    assert_eq!(ints(&stack), vec![1, 2]);
}

#[test]
fn test_finished_lambda_starts_over() {
    let stack = run_code("let: g {1 yield 2}; $g call $g call $g call").unwrap();
    assert_eq!(ints(&stack), vec![1, 2, 1]);
}

#[test]
fn test_yield_keeps_local_bindings() {
    let src = "let: g { let: x 10; $x yield $x 1 + }; $g call $g call";
    assert_eq!(ints(&run_code(src).unwrap()), vec![10, 11]);
}

#[test]
fn test_resume_hides_bindings_of_other_safety_levels() {
    let src = "let: f { unsafe: let: k 7; yield $k ; } fiber; $f call $f call";
    assert_eq!(run_code(src).unwrap_err().kind, ErrorKind::UnknownId);

    let src = "let: g { unsafe: let: k 7; $k ; }; $g call";
    assert_eq!(ints(&run_code(src).unwrap()), vec![7]);

    let src = "let: g { let: k 1; unsafe: let: k 7; yield $k ; }; $g call $g call";
    assert_eq!(ints(&run_code(src).unwrap()), vec![1]);
}

#[test]
fn test_yield_inside_loop() {
    let src = "let: g { 3 {yield1} for }; $g call $g call $g call";
    assert_eq!(ints(&run_code(src).unwrap()), vec![0, 1, 2]);
}

#[test]
fn test_yield_outside_lambda() {
    assert_eq!(run_code("yield").unwrap_err().kind, ErrorKind::UnknownLabel);
}

// ===== fiber =====

#[test]
fn test_fiber_lifecycle() {
    let src = "let: f {1 yield 2} fiber; $f call $f fiber-done $f call $f fiber-done";
    let stack = run_code(src).unwrap();
    assert_eq!(stack.len(), 4);
    assert_eq!(stack[0].as_i64(), Some(1));
    assert_eq!(stack[1].as_bool(), Some(false));
    assert_eq!(stack[2].as_i64(), Some(2));
    assert_eq!(stack[3].as_bool(), Some(true));
}

#[test]
fn test_fibers_are_independent() {
    let src = "let: a {1 yield 2} fiber; let: b {1 yield 2} fiber; \
               $a call $b call $a call $b call";
    assert_eq!(ints(&run_code(src).unwrap()), vec![1, 1, 2, 2]);
}

#[test]
fn test_fiber_over_function() {
    let src = "func: five () 5; &five fiber dup call swap fiber-done";
    let stack = run_code(src).unwrap();
    assert_eq!(stack[0].as_i64(), Some(5));
    assert_eq!(stack[1].as_bool(), Some(true));
}

// ===== OS 线程 =====

#[test]
fn test_thread_join() {
    assert_eq!(ints(&run_code("10 {1 +} thread join").unwrap()), vec![10, 11]);
}

#[test]
fn test_threads_share_functions() {
    let src = "func: sq (I64) dup *; { 0 100 {+} for sq } thread join";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(4950 * 4950));
}

#[test]
fn test_unjoined_threads_leave_the_table() {
    let mut engine = Engine::new();
    engine.eval("{1} thread drop {2} thread drop {3} thread").unwrap();
    let mut running = engine.runtime().prune_threads();
    for _ in 0..500 {
        if running == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
        running = engine.runtime().prune_threads();
    }
    assert_eq!(running, 0);
    assert_eq!(engine.runtime().thread_count(), 0);

    // 被移出线程表的句柄仍然可以 join
    engine.eval("join").unwrap();
    assert_eq!(ints(engine.stack()), vec![3]);
}

#[test]
fn test_double_join_fails() {
    let err = run_code("{1} thread dup join drop join").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Thread);
}

#[test]
fn test_thread_error_surfaces_on_join() {
    let err = run_code("{'bad' raise} thread join").unwrap_err();
    assert_eq!(err.kind, ErrorKind::User);
}
