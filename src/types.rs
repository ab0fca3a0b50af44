// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

/// The language's types as a recursive tagged union. Equality is structural;
/// array size and mutability take part in it.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Unit,
    Uninitialized {
        inner: Option<Box<Type>>,
        mutable: bool,
    },
    Base {
        name: String,
        mutable: bool,
    },
    Array {
        element: Box<Type>,
        size: usize,
        mutable: bool,
    },
    Tuple {
        members: Vec<Type>,
        mutable: bool,
    },
    Reference {
        target: Box<Type>,
        mutable: bool,
    },
    Range {
        element: Box<Type>,
        start: Option<String>,
        end: Option<String>,
        step: i64,
    },
}

impl Type {
    pub fn i32() -> Self {
        Type::Base {
            name: "i32".to_string(),
            mutable: false,
        }
    }

    pub fn bool() -> Self {
        Type::Base {
            name: "bool".to_string(),
            mutable: false,
        }
    }

    pub fn is_unit(&self) -> bool {
        match self {
            Type::Unit => true,
            _ => false,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        match self {
            Type::Uninitialized { .. } => true,
            _ => false,
        }
    }

    pub fn is_base_named(&self, wanted: &str) -> bool {
        match self {
            Type::Base { name, .. } => name == wanted,
            _ => false,
        }
    }

    pub fn is_mutable(&self) -> bool {
        match self {
            Type::Unit => false,
            Type::Uninitialized { mutable, .. }
            | Type::Base { mutable, .. }
            | Type::Array { mutable, .. }
            | Type::Tuple { mutable, .. }
            | Type::Reference { mutable, .. } => *mutable,
            Type::Range { .. } => false,
        }
    }

    pub fn set_mutable(&mut self, value: bool) {
        match self {
            Type::Unit | Type::Range { .. } => (),
            Type::Uninitialized { mutable, .. }
            | Type::Base { mutable, .. }
            | Type::Array { mutable, .. }
            | Type::Tuple { mutable, .. }
            | Type::Reference { mutable, .. } => *mutable = value,
        }
    }

    pub fn with_mutability(mut self, value: bool) -> Self {
        self.set_mutable(value);
        self
    }

    /// Strips an `Uninitialized` wrapper down to the declared/known type.
    /// A wrapper with no inner type yields `None`.
    pub fn effective(&self) -> Option<&Type> {
        match self {
            Type::Uninitialized { inner, .. } => inner.as_ref().map(|t| t.as_ref()),
            other => Some(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "unit"),
            Type::Uninitialized { inner, .. } => match inner {
                Some(inner) => write!(f, "<uninitialized {}>", inner),
                None => write!(f, "<uninitialized>"),
            },
            Type::Base { name, .. } => write!(f, "{}", name),
            Type::Array { element, size, .. } => write!(f, "[{}; {}]", element, size),
            Type::Tuple { members, .. } => {
                write!(f, "(")?;
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                write!(f, ")")
            }
            Type::Reference { target, mutable } => {
                if *mutable {
                    write!(f, "&mut {}", target)
                } else {
                    write!(f, "&{}", target)
                }
            }
            Type::Range { start, end, .. } => write!(
                f,
                "{}..{}",
                start.as_ref().map(String::as_str).unwrap_or("_"),
                end.as_ref().map(String::as_str).unwrap_or("_"),
            ),
        }
    }
}

/// Whether a value of type `actual` can stand where `expected` is required.
/// `Uninitialized` unwraps on either side, reference mutability stays out of
/// it (borrow sites check that), everything else is structural.
pub fn is_type_compatible(actual: &Type, expected: &Type) -> bool {
    if let Type::Uninitialized { inner, .. } = actual {
        return match inner {
            Some(inner) => is_type_compatible(inner, expected),
            None => false,
        };
    }
    if let Type::Uninitialized { inner, .. } = expected {
        return match inner {
            Some(inner) => is_type_compatible(actual, inner),
            None => false,
        };
    }
    match (actual, expected) {
        (Type::Unit, Type::Unit) => true,
        (Type::Base { name: a, .. }, Type::Base { name: e, .. }) => a == e,
        (
            Type::Array { element: a, size: n, .. },
            Type::Array { element: e, size: m, .. },
        ) => n == m && is_type_compatible(a, e),
        (Type::Tuple { members: a, .. }, Type::Tuple { members: e, .. }) => {
            a.len() == e.len() && a.iter().zip(e.iter()).all(|(x, y)| is_type_compatible(x, y))
        }
        (Type::Reference { target: a, .. }, Type::Reference { target: e, .. }) => {
            is_type_compatible(a, e)
        }
        _ => false,
    }
}

/// Whether the binary operator `op` accepts the given operand types.
/// Arithmetic needs `i32` on both sides, relational operators need a
/// compatible pair of base or reference types, logical connectives need
/// `bool` on both sides.
pub fn is_binop_compatible(op: &str, left: &Type, right: &Type) -> bool {
    let left = match left.effective() {
        Some(ty) => ty,
        None => return false,
    };
    let right = match right.effective() {
        Some(ty) => ty,
        None => return false,
    };
    match op {
        "+" | "-" | "*" | "/" | "%" => {
            left.is_base_named("i32") && right.is_base_named("i32")
        }
        "<" | "<=" | ">" | ">=" | "==" | "!=" => {
            is_type_compatible(left, right)
                && match left {
                    Type::Base { .. } | Type::Reference { .. } => true,
                    _ => false,
                }
        }
        "&&" | "||" => left.is_base_named("bool") && right.is_base_named("bool"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let array = Type::Array {
            element: Box::new(Type::i32()),
            size: 3,
            mutable: false,
        };
        assert_eq!(array.to_string(), "[i32; 3]");
        let tuple = Type::Tuple {
            members: vec![Type::i32(), Type::bool()],
            mutable: false,
        };
        assert_eq!(tuple.to_string(), "(i32, bool)");
        let reference = Type::Reference {
            target: Box::new(Type::i32()),
            mutable: true,
        };
        assert_eq!(reference.to_string(), "&mut i32");
        let unknown = Type::Uninitialized {
            inner: None,
            mutable: false,
        };
        assert_eq!(unknown.to_string(), "<uninitialized>");
    }

    #[test]
    fn array_equality_includes_size_and_mutability() {
        let a = Type::Array {
            element: Box::new(Type::i32()),
            size: 3,
            mutable: false,
        };
        let b = Type::Array {
            element: Box::new(Type::i32()),
            size: 4,
            mutable: false,
        };
        let c = a.clone().with_mutability(true);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn uninitialized_unwraps_for_compatibility() {
        let wrapped = Type::Uninitialized {
            inner: Some(Box::new(Type::i32())),
            mutable: true,
        };
        assert!(is_type_compatible(&wrapped, &Type::i32()));
        assert!(is_type_compatible(&Type::i32(), &wrapped));
        let unknown = Type::Uninitialized {
            inner: None,
            mutable: false,
        };
        assert!(!is_type_compatible(&unknown, &Type::i32()));
    }

    #[test]
    fn reference_compatibility_ignores_mutability() {
        let shared = Type::Reference {
            target: Box::new(Type::i32()),
            mutable: false,
        };
        let unique = Type::Reference {
            target: Box::new(Type::i32()),
            mutable: true,
        };
        assert!(is_type_compatible(&shared, &unique));
    }

    #[test]
    fn binop_compatibility() {
        assert!(is_binop_compatible("+", &Type::i32(), &Type::i32()));
        assert!(!is_binop_compatible("+", &Type::i32(), &Type::bool()));
        assert!(is_binop_compatible("<", &Type::i32(), &Type::i32()));
        assert!(!is_binop_compatible("<", &Type::Unit, &Type::Unit));
        assert!(is_binop_compatible("&&", &Type::bool(), &Type::bool()));
        assert!(!is_binop_compatible("&&", &Type::i32(), &Type::bool()));
        let reference = Type::Reference {
            target: Box::new(Type::i32()),
            mutable: false,
        };
        assert!(is_binop_compatible("==", &reference, &reference));
    }
}
