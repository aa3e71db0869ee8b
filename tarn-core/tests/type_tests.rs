//! 类型图、泛型、重载分派与隐式转换

mod common;
use common::{ints, run_code, top_bool, top_int, top_str};
use tarn_core::{Engine, ErrorKind};

// ===== 类型与泛型 =====

#[test]
fn test_type_of_values() {
    let stack = run_code("42 type").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "I64");
    let stack = run_code("[0 1 2] type").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "List<I64>");
    let stack = run_code("[] type").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "List<Any>");
}

#[test]
fn test_list_element_type_is_common_supertype() {
    let stack = run_code("[1 1/2] type").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "List<Num>");
}

#[test]
fn test_isa_and_is() {
    assert_eq!(top_bool(&run_code("I64 Num isa").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("Str I64 isa").unwrap()), Some(false));
    assert_eq!(top_bool(&run_code("[0 1 2] List<I64> is").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("[0 1 2] Seq is").unwrap()), Some(true));
}

#[test]
fn test_generic_instances_are_shared() {
    assert_eq!(top_bool(&run_code("List<I64> List<I64> =").unwrap()), Some(true));
    assert_eq!(top_bool(&run_code("List<I64> List<Str> =").unwrap()), Some(false));
}

#[test]
fn test_generic_errors() {
    assert_eq!(run_code("Nope<I64>").unwrap_err().kind, ErrorKind::UnknownTemplate);
    assert_eq!(run_code("List<I64,I64>").unwrap_err().kind, ErrorKind::GenericArity);
}

// ===== 用户函数与重载 =====

#[test]
fn test_user_function() {
    assert_eq!(top_int(&run_code("func: sq (I64) dup *; 7 sq").unwrap()), Some(49));
}

#[test]
fn test_recursive_function() {
    let src = "func: fact (I64) dup 1 <= {drop 1} {dup 1 - fact *} if; 5 fact";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(120));
}

#[test]
fn test_overloads_newest_first() {
    let src = "func: describe (Any) drop 'any'; func: describe (I64) drop 'int'; 1 describe";
    assert_eq!(top_str(&run_code(src).unwrap()).as_deref(), Some("int"));
    let src = "func: describe (Any) drop 'any'; func: describe (I64) drop 'int'; 'x' describe";
    assert_eq!(top_str(&run_code(src).unwrap()).as_deref(), Some("any"));
}

#[test]
fn test_same_type_argument() {
    let src = "func: both (Any Any) drop drop 'diff'; func: both (Any %0) drop drop 'same'; ";
    assert_eq!(
        top_str(&run_code(&format!("{src} 1 2 both")).unwrap()).as_deref(),
        Some("same")
    );
    assert_eq!(
        top_str(&run_code(&format!("{src} 1 'a' both")).unwrap()).as_deref(),
        Some("diff")
    );
}

#[test]
fn test_type_argument_reference() {
    let src = "func: add (List<Any> %0.0) push; [1 2] 3 add len";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(3));
    let err = run_code("func: add (List<Any> %0.0) push; [1 2] 'x' add").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotApplicable);
}

#[test]
fn test_safety_levels() {
    assert_eq!(
        run_code("func: danger (I64) unsafe; 1 danger").unwrap_err().kind,
        ErrorKind::UnsafeCall
    );
    assert_eq!(
        top_int(&run_code("func: danger (I64) unsafe; unsafe: 1 danger ;").unwrap()),
        Some(1)
    );
}

#[test]
fn test_function_is_visible_after_compile() {
    let mut engine = Engine::new();
    engine.eval("func: inc (I64) 1 +;").unwrap();
    assert!(engine.runtime().find_func("inc").is_some());
    engine.eval("41 inc").unwrap();
    assert_eq!(engine.peek().and_then(|v| v.as_i64()), Some(42));
}

#[test]
fn test_function_reference() {
    assert_eq!(top_int(&run_code("func: sq (I64) dup *; 3 &sq call").unwrap()), Some(9));
}

// ===== 转换 =====

#[test]
fn test_implicit_conversion() {
    let src = "conv: I64 Str str; func: width (Str) len; 12345 width";
    assert_eq!(top_int(&run_code(src).unwrap()), Some(5));
}

#[test]
fn test_no_conversion_without_registration() {
    let err = run_code("func: width (Str) len; 12345 width").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotApplicable);
}

// ===== 结构体 =====

#[test]
fn test_struct() {
    let src = "struct: Point x:I64 y:I64; 1 2 Point new";
    let stack = run_code(&format!("{src} .x")).unwrap();
    assert_eq!(top_int(&stack), Some(1));
    let stack = run_code(&format!("{src} 5 .y= .y")).unwrap();
    assert_eq!(top_int(&stack), Some(5));
    let stack = run_code(&format!("{src} Struct is")).unwrap();
    assert_eq!(top_bool(&stack), Some(true));
}

#[test]
fn test_struct_field_types_are_checked() {
    let err = run_code("struct: Point x:I64 y:I64; 'a' 2 Point new").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotApplicable);
}

#[test]
fn test_struct_prints_fields() {
    let stack = run_code("struct: Pt x y; 1 2 Pt new").unwrap();
    assert_eq!(stack.last().unwrap().to_string(), "Pt(1 2)");
    assert_eq!(stack.last().unwrap().dump(), "Pt(x: 1 y: 2)");
    assert_eq!(ints(&run_code("struct: Pt x y; 1 2 Pt new .x").unwrap()), vec![1]);
}
