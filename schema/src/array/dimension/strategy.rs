use proptest::prelude::*;

use cellstore_common::array::ArrayType;
use cellstore_common::datatype::Datatype;
use cellstore_common::datatype::strategy::DatatypeContext;
use cellstore_common::{datatype_go, dimension_constraints_go};

use crate::array::dimension::DimensionData;

pub fn prop_dimension_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9_]+")
        .expect("Error creating dimension name strategy")
}

/// Generates a `[low, high]` domain and optional tile extent satisfying
/// `low < low + extent <= high` when an extent is present.
fn prop_range_and_extent<T>() -> impl Strategy<Value = ([T; 2], Option<T>)>
where
    T: num_traits::Bounded
        + num_traits::FromPrimitive
        + Copy
        + std::fmt::Debug
        + PartialOrd
        + std::ops::Sub<Output = T>
        + 'static,
    std::ops::Range<T>: Strategy<Value = T>,
{
    let one = T::from_u8(1).unwrap();
    let lower_limit = T::min_value();
    let upper_limit = T::max_value();

    (lower_limit + one + one..upper_limit - one).prop_flat_map(move |high| {
        (lower_limit + one..high).prop_flat_map(move |low| {
            let extent_limit = T::from_u64(1024).unwrap_or(upper_limit);
            let max_extent = if high - low < extent_limit {
                high - low
            } else {
                extent_limit
            };
            (
                Just([low, high]),
                proptest::option::of(one..(max_extent + one)),
            )
        })
    })
}

fn prop_dimension_for_datatype(
    datatype: Datatype,
) -> impl Strategy<Value = DimensionData> {
    let constraints = datatype_go!(datatype, DT, {
        prop_range_and_extent::<DT>()
            .prop_map(
                cellstore_common::array::dimension::DimensionConstraints::from,
            )
            .boxed()
    });

    (prop_dimension_name(), constraints).prop_map(
        move |(name, constraints)| DimensionData {
            name,
            datatype,
            constraints,
        },
    )
}

impl Arbitrary for DimensionData {
    type Parameters = Option<ArrayType>;
    type Strategy = BoxedStrategy<DimensionData>;

    fn arbitrary_with(array_type: Self::Parameters) -> Self::Strategy {
        let context = match array_type {
            Some(ArrayType::Dense) => DatatypeContext::DenseDimension,
            Some(ArrayType::Sparse) => DatatypeContext::SparseDimension,
            None => DatatypeContext::SparseDimension,
        };
        any_with::<Datatype>(context)
            .prop_flat_map(prop_dimension_for_datatype)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn dimension_domain_well_formed(d in any::<DimensionData>()) {
            let (low, high) = dimension_constraints_go!(
                &d.constraints,
                _DT,
                [low, high],
                _extent,
                (*low as i128, *high as i128)
            );
            prop_assert!(low < high);
        }
    }
}
