// Copyright 2023 Xayn AG
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::iter;

use float_cmp::ApproxEq;
use ndarray::{ArrayBase, Data, Dimension, IntoDimension, Ix};

/// Asserts that two float values or containers of floats are approximately equal.
///
/// Works for scalars, slices, arrays, vectors and ndarray arrays of any dimension, as long as
/// both sides iterate the same indices in logical order:
///
/// ```
/// use ndarray::arr1;
/// use xayn_test_utils::assert_approx_eq;
///
/// assert_approx_eq!(f32, 0.5, 0.5);
/// assert_approx_eq!(f32, arr1(&[0.25, 0.75]), [0.25, 0.75]);
/// assert_approx_eq!(f32, 0.125, 0.126, epsilon = 1e-2);
/// ```
///
/// The number of `ulps` defaults to `2` and the `epsilon` to `0`. Two NaN values compare as
/// equal, since the assertion checks for an expected outcome.
#[macro_export]
macro_rules! assert_approx_eq {
    ($t:ty, $left:expr, $right:expr $(,)?) => {
        $crate::assert_approx_eq!($t, $left, $right, epsilon = 0., ulps = 2)
    };
    ($t:ty, $left:expr, $right:expr, ulps = $ulps:expr $(,)?) => {
        $crate::assert_approx_eq!($t, $left, $right, epsilon = 0., ulps = $ulps)
    };
    ($t:ty, $left:expr, $right:expr, epsilon = $epsilon:expr $(,)?) => {
        $crate::assert_approx_eq!($t, $left, $right, epsilon = $epsilon, ulps = 2)
    };
    ($t:ty, $left:expr, $right:expr, epsilon = $epsilon:expr, ulps = $ulps:expr $(,)?) => {{
        let epsilon = $epsilon;
        let ulps = $ulps;
        let left = &$left;
        let right = &$right;
        let mut left_iter =
            $crate::ApproxEqIter::<$t>::indexed_iter_logical_order(left, Vec::new());
        let mut right_iter =
            $crate::ApproxEqIter::<$t>::indexed_iter_logical_order(right, Vec::new());
        loop {
            match (left_iter.next(), right_iter.next()) {
                (Some((lidx, lv)), Some((ridx, rv))) => {
                    std::assert_eq!(lidx, ridx, "Mismatched indices: {:?} != {:?}", lidx, ridx);
                    if !(lv.is_nan() && rv.is_nan()) {
                        std::assert!(
                            $crate::approx_eq!($t, lv, rv, ulps = ulps, epsilon = epsilon),
                            "Approximated equal assertion failed (ulps={:?}, epsilon={:?}) at index {:?}: {:?} != {:?}",
                            ulps, epsilon, lidx, lv, rv,
                        );
                    }
                }
                (Some(pair), None) => {
                    std::panic!("Left input is longer starting from index {:?}", pair);
                }
                (None, Some(pair)) => {
                    std::panic!("Right input is longer starting from index {:?}", pair);
                }
                (None, None) => break,
            }
        }
    }};
}

/// Flattens a value into its float leaves for [`assert_approx_eq!`].
pub trait ApproxEqIter<'a, Leaf>
where
    Self: 'a,
    Leaf: ApproxEq + Copy,
{
    /// Iterates over all leaves together with their index, prefixed by `index_prefix`.
    fn indexed_iter_logical_order(
        &'a self,
        index_prefix: Vec<Ix>,
    ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, Leaf)>>;
}

macro_rules! impl_approx_eq_iter {
    ($($t:ty),+ $(,)?) => {
        $(
            impl<'a> ApproxEqIter<'a, $t> for $t {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    Box::new(iter::once((index_prefix, *self)))
                }
            }

            impl<'a, T> ApproxEqIter<'a, $t> for &'a T
            where
                T: 'a + ApproxEqIter<'a, $t> + ?Sized,
            {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    (*self).indexed_iter_logical_order(index_prefix)
                }
            }

            impl<'a, T> ApproxEqIter<'a, $t> for [T]
            where
                T: 'a + ApproxEqIter<'a, $t>,
            {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    Box::new(self.iter().enumerate().flat_map(move |(idx, el)| {
                        let mut index_prefix = index_prefix.clone();
                        index_prefix.push(idx);
                        el.indexed_iter_logical_order(index_prefix)
                    }))
                }
            }

            impl<'a, T, const N: usize> ApproxEqIter<'a, $t> for [T; N]
            where
                T: 'a + ApproxEqIter<'a, $t>,
            {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    self.as_slice().indexed_iter_logical_order(index_prefix)
                }
            }

            impl<'a, T> ApproxEqIter<'a, $t> for Vec<T>
            where
                T: 'a + ApproxEqIter<'a, $t>,
            {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    self.as_slice().indexed_iter_logical_order(index_prefix)
                }
            }

            impl<'a, S, D> ApproxEqIter<'a, $t> for ArrayBase<S, D>
            where
                S: 'a + Data<Elem = $t>,
                D: 'a + Dimension,
            {
                fn indexed_iter_logical_order(
                    &'a self,
                    index_prefix: Vec<Ix>,
                ) -> Box<dyn 'a + Iterator<Item = (Vec<Ix>, $t)>> {
                    Box::new(self.indexed_iter().map(move |(idx, el)| {
                        let mut index_prefix = index_prefix.clone();
                        index_prefix.extend(idx.into_dimension().as_array_view().iter());
                        (index_prefix, *el)
                    }))
                }
            }
        )+
    };
}

impl_approx_eq_iter! { f32, f64 }
