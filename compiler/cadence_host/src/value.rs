//! Runtime values of the reference host.

use std::fmt;

use cadence_ir::Ty;

/// Defines a `u32` handle newtype.
macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub(crate) fn new(raw: usize) -> Self {
                Self(u32::try_from(raw).unwrap_or(u32::MAX))
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    )* };
}

define_handle! {
    /// An object owning per-instance persistent slots.
    InstanceId,
    /// A deferred result observed by callers and joins.
    TaskId,
    /// A cooperative cancellation handle.
    CancelId,
    /// A closure value created by a lambda.
    ClosureId,
    /// A loaded entry or dispatch procedure.
    ProcIndex,
}

/// A value held in a slot, local, field or argument.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Task(TaskId),
    Cancel(CancelId),
    Closure(ClosureId),
}

impl Value {
    /// Initial content of a slot or uninitialized local of type `ty`.
    pub fn default_for(ty: &Ty) -> Value {
        match ty {
            Ty::Bool => Value::Bool(false),
            Ty::Int => Value::Int(0),
            Ty::Float => Value::Float(0.0),
            Ty::Str => Value::Str(String::new()),
            Ty::Array(_) => Value::Array(Vec::new()),
            Ty::Unit
            | Ty::Object(_)
            | Ty::Deferred(_)
            | Ty::Cancellation
            | Ty::ByRef(_)
            | Ty::Closure
            | Ty::Opaque(_) => Value::Unit,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "void",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Task(_) => "task",
            Value::Cancel(_) => "cancellation token",
            Value::Closure(_) => "closure",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as `f64`; ints widen.
    #[expect(clippy::cast_precision_loss, reason = "timing values are small")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<TaskId> {
        match self {
            Value::Task(task) => Some(*task),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Task(task) => write!(f, "<task {}>", task.0),
            Value::Cancel(token) => write!(f, "<token {}>", token.0),
            Value::Closure(closure) => write!(f, "<closure {}>", closure.0),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
