//! Equality policies for signal writes.
//!
//! A write that the signal's policy considers equal to the current value is
//! dropped without notifying anyone. The default policy compares with
//! [`PartialEq`]; [`never`] notifies on every write and [`ptr_eq`] compares
//! shared values by identity, so replacing an `Rc` with a structurally equal
//! copy still notifies.

use std::fmt;
use std::rc::Rc;

/// Comparator deciding whether a write changes a signal.
pub struct Equality<T: ?Sized> {
    eq: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: ?Sized + 'static> Equality<T> {
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self { eq: Rc::new(eq) }
    }

    pub fn is_equal(&self, old: &T, new: &T) -> bool {
        (self.eq)(old, new)
    }
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Rc::clone(&self.eq),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality(..)")
    }
}

/// Value equality through [`PartialEq`].
pub fn partial_eq<T>() -> Equality<T>
where
    T: PartialEq + 'static,
{
    Equality::new(|old: &T, new: &T| old == new)
}

/// Treat every write as a change.
pub fn never<T: 'static>() -> Equality<T> {
    Equality::new(|_: &T, _: &T| false)
}

/// Reference identity for shared values.
pub fn ptr_eq<U: ?Sized + 'static>() -> Equality<Rc<U>> {
    Equality::new(|old: &Rc<U>, new: &Rc<U>| Rc::ptr_eq(old, new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_eq_compares_values() {
        let eq = partial_eq::<String>();
        assert!(eq.is_equal(&"a".to_string(), &"a".to_string()));
        assert!(!eq.is_equal(&"a".to_string(), &"b".to_string()));
    }

    #[test]
    fn never_reports_change() {
        let eq = never::<i32>();
        assert!(!eq.is_equal(&1, &1));
    }

    #[test]
    fn ptr_eq_compares_identity() {
        let eq = ptr_eq::<Vec<i32>>();
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(eq.is_equal(&a, &a.clone()));
        assert!(!eq.is_equal(&a, &b));
    }
}
