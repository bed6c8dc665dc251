use pretty_assertions::assert_eq;

use super::*;

#[test]
fn integer_arithmetic_wraps_and_rejects_zero_divisors() {
    assert_eq!(
        binary(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1)),
        Ok(Value::Int(i64::MIN))
    );
    assert_eq!(binary(BinaryOp::Rem, Value::Int(7), Value::Int(3)), Ok(Value::Int(1)));
    assert_eq!(
        binary(BinaryOp::Div, Value::Int(1), Value::Int(0)),
        Err(HostError::DivisionByZero)
    );
}

#[test]
fn mixed_numbers_widen_to_float() {
    assert_eq!(
        binary(BinaryOp::Mul, Value::Int(2), Value::Float(1.5)),
        Ok(Value::Float(3.0))
    );
    assert_eq!(
        binary(BinaryOp::Eq, Value::Int(2), Value::Float(2.0)),
        Ok(Value::Bool(true))
    );
    assert_eq!(
        binary(BinaryOp::Lt, Value::Float(0.5), Value::Int(1)),
        Ok(Value::Bool(true))
    );
}

#[test]
fn strings_concatenate_with_anything() {
    assert_eq!(
        binary(BinaryOp::Add, Value::from("n="), Value::Int(3)),
        Ok(Value::from("n=3"))
    );
    assert_eq!(
        binary(BinaryOp::Sub, Value::from("a"), Value::Int(3)),
        Err(HostError::TypeMismatch {
            expected: "number",
            found: "string",
        })
    );
}

#[test]
fn logic_needs_booleans() {
    assert_eq!(
        binary(BinaryOp::Or, Value::Bool(false), Value::Bool(true)),
        Ok(Value::Bool(true))
    );
    assert_eq!(
        binary(BinaryOp::And, Value::Bool(true), Value::Int(1)),
        Err(HostError::TypeMismatch {
            expected: "bool",
            found: "int",
        })
    );
    assert_eq!(unary(UnaryOp::Not, Value::Bool(true)), Ok(Value::Bool(false)));
    assert_eq!(unary(UnaryOp::Neg, Value::Float(2.0)), Ok(Value::Float(-2.0)));
    assert!(unary(UnaryOp::Not, Value::Int(0)).is_err());
}

#[test]
fn equality_is_structural() {
    assert_eq!(
        binary(BinaryOp::NotEq, Value::from("a"), Value::from("a")),
        Ok(Value::Bool(false))
    );
    assert_eq!(
        binary(BinaryOp::Eq, Value::Unit, Value::Int(0)),
        Ok(Value::Bool(false))
    );
}
