//! 语言核心端到端测试：栈、lambda、绑定、标签、字面量

mod common;
use common::{ints, run_code, top_bool, top_int, top_str};
use tarn_core::ErrorKind;

// ===== 栈与算术 =====

#[test]
fn test_arithmetic() {
    assert_eq!(top_int(&run_code("1 2 +").unwrap()), Some(3));
    assert_eq!(top_int(&run_code("10 3 -").unwrap()), Some(7));
    assert_eq!(top_int(&run_code("4 5 *").unwrap()), Some(20));
    assert_eq!(top_int(&run_code("20 4 /").unwrap()), Some(5));
    assert_eq!(top_int(&run_code("7 3 mod").unwrap()), Some(1));
    assert_eq!(top_int(&run_code("-3 1 +").unwrap()), Some(-2));
}

#[test]
fn test_rationals() {
    let stack = run_code("1/2 1/3 +").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "5/6");
    let stack = run_code("2 4 rat").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "1/2");
}

#[test]
fn test_arithmetic_errors() {
    assert_eq!(run_code("1 0 /").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("1 'a' +").unwrap_err().kind, ErrorKind::NotApplicable);
}

#[test]
fn test_integer_overflow_is_an_error() {
    for code in [
        "9223372036854775807 1 +",
        "-9223372036854775808 1 -",
        "4611686018427387904 2 *",
        "-9223372036854775808 -1 /",
        "-9223372036854775808 -1 mod",
        "1 0 mod",
    ] {
        assert_eq!(run_code(code).unwrap_err().kind, ErrorKind::Arithmetic, "{code}");
    }
    assert_eq!(top_int(&run_code("9223372036854775806 1 +").unwrap()), Some(i64::MAX));
}

#[test]
fn test_rational_edges() {
    assert_eq!(run_code("1 0 rat").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("-9223372036854775808 -1 rat").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("1/0").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("-9223372036854775808/-1").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("-9223372036854775808/1 -1/1 /").unwrap_err().kind, ErrorKind::Arithmetic);
    assert_eq!(run_code("1/2 0/1 /").unwrap_err().kind, ErrorKind::Arithmetic);

    let stack = run_code("-9223372036854775808 -9223372036854775808 rat").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "1/1");
}

#[test]
fn test_stack_words() {
    assert_eq!(ints(&run_code("1 dup").unwrap()), vec![1, 1]);
    assert_eq!(ints(&run_code("1 2 swap").unwrap()), vec![2, 1]);
    assert_eq!(ints(&run_code("1 2 3 rot").unwrap()), vec![2, 3, 1]);
    assert!(run_code("42 reset").unwrap().is_empty());
    assert_eq!(top_int(&run_code("1 2 3 depth").unwrap()), Some(3));
    assert_eq!(ints(&run_code("1 2 3 drop").unwrap()), vec![1, 2]);
}

#[test]
fn test_comparison() {
    assert_eq!(top_bool(&run_code("1 2 <").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("2 2 >=").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("'a' 'a' =").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("true not").unwrap()), Some(false));
}

// ===== lambda 与调用 =====

#[test]
fn test_lambda_call() {
    assert_eq!(top_int(&run_code("{1 2 +} call").unwrap()), Some(3));
    // lambda 共享调用者的值栈
    assert_eq!(top_int(&run_code("2 {3 +} call").unwrap()), Some(5));
}

#[test]
fn test_return_skips_rest() {
    assert_eq!(ints(&run_code("{1 return 2} call").unwrap()), vec![1]);
    // return1 从外层 lambda 返回
    assert_eq!(
        ints(&run_code("{ {1 return1 2} call 3 } call 4").unwrap()),
        vec![1, 4]
    );
}

#[test]
fn test_recall_loops() {
    let stack = run_code("0 { 1 + dup 5 < {recall1} {} if } call").unwrap();
    assert_eq!(top_int(&stack), Some(5));
}

#[test]
fn test_if() {
    assert_eq!(top_int(&run_code("true 1 2 if").unwrap()), Some(1));
    assert_eq!(top_int(&run_code("false 1 2 if").unwrap()), Some(2));
    assert_eq!(top_int(&run_code("nil {10} {20} if").unwrap()), Some(20));
}

// ===== 绑定 =====

#[test]
fn test_let() {
    assert_eq!(top_int(&run_code("let: foo 35 7 +; $foo").unwrap()), Some(42));
}

#[test]
fn test_rebinding_in_same_scope_fails() {
    let err = run_code("let: x 1; let: x 2;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateRegistration);
    // 内层作用域可以遮蔽
    assert_eq!(top_int(&run_code("let: x 1; (let: x 2; $x) $x +").unwrap()), Some(3));
}

#[test]
fn test_closure_snapshot() {
    let src = "let: x 1; let: f {$x}; (let: x 2; $f call)";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(1));
}

#[test]
fn test_unknown_identifier() {
    let err = run_code("1 nope").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownId);
    let err = run_code("$nope").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownId);
}

// ===== 块与标签 =====

#[test]
fn test_block_keeps_top() {
    assert_eq!(ints(&run_code("1 (2 3 4) 5").unwrap()), vec![1, 4, 5]);
    assert_eq!(ints(&run_code("( )").unwrap()), Vec::<i64>::new());
}

#[test]
fn test_jump_to_label() {
    assert_eq!(top_int(&run_code("1 2 exit! 3 @exit +").unwrap()), Some(3));
}

#[test]
fn test_unknown_label() {
    let err = run_code("nowhere!").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownLabel);
}

// ===== 字面量 =====

#[test]
fn test_string_interpolation() {
    let stack = run_code("let: n 42; 'n=$n'").unwrap();
    assert_eq!(top_str(&stack).as_deref(), Some("n=42"));
    let stack = run_code("'tab\\there'").unwrap();
    assert_eq!(top_str(&stack).as_deref(), Some("tab\there"));
}

#[test]
fn test_symbols_and_chars() {
    let stack = run_code("#foo #foo =").unwrap();
    assert_eq!(top_bool(&stack), Some(true));
    let stack = run_code("\\a type").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "Char");
}

#[test]
fn test_compile_errors_carry_position() {
    let err = run_code("1 2 )").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
    assert_eq!(err.pos, Some(4));
    let err = run_code("{ 1 2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnbalancedBraces);
}
