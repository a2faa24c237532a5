use std::cmp::Ordering;

use super::coerce;
use crate::value::Value;

/// Outcome of the three-way comparison. `Unordered` is distinct from the
/// three ordered results and satisfies no relational operator; it shows up
/// whenever NaN or dictionary identity makes an ordering undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Unordered,
}

impl From<Ordering> for Comparison {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

/// Three-way compare, driven by the left operand's type. Dictionaries only
/// ever compare equal to themselves; everything else coerces the right
/// operand to the left one's domain. Returns `None` when either side is
/// `Unknown`, which the evaluator reports as an internal error.
pub fn compare<D: PartialEq>(
    left: &Value<D>,
    right: &Value<D>,
    serialize: impl FnOnce(&D) -> Option<String>,
) -> Option<Comparison> {
    match (left, right) {
        (Value::Unknown, _) | (_, Value::Unknown) => None,
        (Value::Dict(a), Value::Dict(b)) => Some(if a == b {
            Comparison::Equal
        } else {
            Comparison::Unordered
        }),
        (Value::Dict(_), _) | (_, Value::Dict(_)) => Some(Comparison::Unordered),
        (Value::Str(a), b) => {
            let b = coerce::to_string(b, serialize);
            Some(a.as_ref().cmp(b.as_str()).into())
        }
        (Value::Bool(a), b) => Some(a.cmp(&coerce::to_bool(b)).into()),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b).into()),
        (Value::Int(a), Value::Bool(b)) => Some(a.cmp(&(*b as i64)).into()),
        (Value::Int(a), b) => Some(float_compare(*a as f64, coerce::to_float(b))),
        (Value::Float(a), b) => Some(float_compare(*a, coerce::to_float(b))),
    }
}

fn float_compare(a: f64, b: f64) -> Comparison {
    match a.partial_cmp(&b) {
        Some(ordering) => ordering.into(),
        None => Comparison::Unordered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type V = Value<u32>;

    fn cmp(a: &V, b: &V) -> Comparison {
        compare(a, b, |_| None).expect("comparable values")
    }

    #[test]
    fn same_type_comparisons_are_a_total_order() {
        let families: Vec<Vec<V>> = vec![
            vec![V::Int(-3), V::Int(0), V::Int(5), V::Int(i64::MAX)],
            vec![V::Float(-1.5), V::Float(0.0), V::Float(2.5)],
            vec![V::str(""), V::str("a"), V::str("ab"), V::str("b")],
            vec![V::Bool(false), V::Bool(true)],
        ];
        for family in &families {
            for (i, a) in family.iter().enumerate() {
                for (j, b) in family.iter().enumerate() {
                    let expected = i.cmp(&j).into();
                    assert_eq!(cmp(a, b), expected, "{:?} vs {:?}", a, b);
                    // antisymmetry
                    let flipped = match expected {
                        Comparison::Less => Comparison::Greater,
                        Comparison::Greater => Comparison::Less,
                        other => other,
                    };
                    assert_eq!(cmp(b, a), flipped);
                }
            }
        }
    }

    #[test]
    fn left_operand_drives_mixed_comparisons() {
        // string on the left: the right side is compared in string form
        assert_eq!(cmp(&V::str("10"), &V::Int(10)), Comparison::Equal);
        assert_eq!(cmp(&V::str("true"), &V::Bool(true)), Comparison::Equal);
        // bool on the left: the right side collapses to truthiness
        assert_eq!(cmp(&V::Bool(true), &V::Int(7)), Comparison::Equal);
        assert_eq!(cmp(&V::Bool(false), &V::str("")), Comparison::Equal);
        // int on the left: ints and bools compare as integers...
        assert_eq!(cmp(&V::Int(1), &V::Bool(true)), Comparison::Equal);
        assert_eq!(cmp(&V::Int(2), &V::Bool(true)), Comparison::Greater);
        // ...strings and floats push the comparison onto the float path
        assert_eq!(cmp(&V::Int(10), &V::str("9.5")), Comparison::Greater);
        assert_eq!(cmp(&V::Int(1), &V::Float(1.0)), Comparison::Equal);
    }

    #[test]
    fn nan_is_unordered() {
        assert_eq!(cmp(&V::Float(f64::NAN), &V::Float(f64::NAN)), Comparison::Unordered);
        assert_eq!(cmp(&V::Float(f64::NAN), &V::Int(1)), Comparison::Unordered);
        assert_eq!(cmp(&V::Int(1), &V::Float(f64::NAN)), Comparison::Unordered);
        assert_eq!(cmp(&V::Int(1), &V::str("nan")), Comparison::Unordered);
    }

    #[test]
    fn dicts_compare_by_identity_only() {
        assert_eq!(cmp(&V::Dict(1), &V::Dict(1)), Comparison::Equal);
        assert_eq!(cmp(&V::Dict(1), &V::Dict(2)), Comparison::Unordered);
        assert_eq!(cmp(&V::Dict(1), &V::Int(1)), Comparison::Unordered);
        assert_eq!(cmp(&V::str("x"), &V::Dict(1)), Comparison::Unordered);
    }

    #[test]
    fn unknown_is_not_comparable() {
        assert_eq!(compare(&V::Unknown, &V::Int(1), |_| None), None);
        assert_eq!(compare(&V::Int(1), &V::Unknown, |_| None), None);
    }
}
