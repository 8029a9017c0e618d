use proptest::prelude::*;

use cellstore_common::array::ArrayType;

use crate::array::domain::DomainData;
use crate::array::dimension::DimensionData;

#[derive(Clone)]
pub struct Requirements {
    pub array_type: Option<ArrayType>,
    pub ndim: std::ops::RangeInclusive<usize>,
}

impl Default for Requirements {
    fn default() -> Self {
        Requirements {
            array_type: None,
            ndim: 1..=4,
        }
    }
}

fn prop_domain(requirements: Requirements) -> impl Strategy<Value = DomainData> {
    proptest::collection::vec(
        any_with::<DimensionData>(requirements.array_type),
        requirements.ndim,
    )
    .prop_map(|dimension| DomainData { dimension })
}

impl Arbitrary for DomainData {
    type Parameters = Requirements;
    type Strategy = BoxedStrategy<DomainData>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        prop_domain(args).boxed()
    }
}
