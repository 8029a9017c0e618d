use proptest::prelude::*;

use cellstore_common::array::{ArrayType, CellOrder, TileOrder};

use crate::array::domain::DomainData;
use crate::array::domain::strategy::Requirements as DomainRequirements;
use crate::array::schema::SchemaData;
use crate::array::{AttributeData, DimensionData, FieldData};

#[derive(Clone)]
pub struct Requirements {
    pub array_type: Option<ArrayType>,
    pub num_attributes: std::ops::RangeInclusive<usize>,
}

impl Default for Requirements {
    fn default() -> Self {
        Requirements {
            array_type: None,
            num_attributes: 1..=4,
        }
    }
}

fn prop_schema_for_domain(
    array_type: ArrayType,
    domain: DomainData,
    num_attributes: std::ops::RangeInclusive<usize>,
) -> impl Strategy<Value = SchemaData> {
    let capacity = match array_type {
        ArrayType::Dense => Just(None).boxed(),
        ArrayType::Sparse => (1000u64..=100_000).prop_map(Some).boxed(),
    };

    (
        capacity,
        any_with::<CellOrder>(Some(array_type)),
        any::<TileOrder>(),
        proptest::collection::vec(any_with::<AttributeData>(None), num_attributes),
    )
        .prop_map(move |(capacity, cell_order, tile_order, attributes)| {
            // de-duplicate attribute names against each other and the
            // dimension names, like the teacher's schema generator does
            let mut used: std::collections::HashSet<String> = domain
                .dimension
                .iter()
                .map(|d| d.name.clone())
                .collect();
            let mut attributes = attributes;
            for (i, a) in attributes.iter_mut().enumerate() {
                while !used.insert(a.name.clone()) {
                    a.name = format!("{}_{}", a.name, i);
                }
            }

            SchemaData::new(
                "proptest",
                array_type,
                domain.clone(),
                attributes,
                capacity,
                Some(cell_order),
                Some(tile_order),
                0,
            )
            .expect("generated schema must be valid")
        })
}

fn prop_schema(
    requirements: Requirements,
) -> impl Strategy<Value = SchemaData> {
    let array_type_strat = match requirements.array_type {
        Some(a) => Just(a).boxed(),
        None => any::<ArrayType>().boxed(),
    };
    let num_attributes = requirements.num_attributes;
    array_type_strat.prop_flat_map(move |array_type| {
        let num_attributes = num_attributes.clone();
        any_with::<DomainData>(DomainRequirements {
            array_type: Some(array_type),
            ..Default::default()
        })
        .prop_flat_map(move |domain| {
            prop_schema_for_domain(array_type, domain, num_attributes.clone())
        })
    })
}

impl Arbitrary for SchemaData {
    type Parameters = Requirements;
    type Strategy = BoxedStrategy<SchemaData>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        prop_schema(args).boxed()
    }
}

impl SchemaData {
    pub fn strat_dimension(&self) -> impl Strategy<Value = DimensionData> {
        proptest::sample::select(self.domain.dimension.clone())
    }

    pub fn strat_attribute(&self) -> impl Strategy<Value = AttributeData> {
        proptest::sample::select(self.attributes.clone())
    }

    pub fn strat_field(&self) -> impl Strategy<Value = FieldData> {
        proptest::sample::select(
            self.domain
                .dimension
                .clone()
                .into_iter()
                .map(FieldData::Dimension)
                .chain(
                    self.attributes
                        .clone()
                        .into_iter()
                        .map(FieldData::Attribute),
                )
                .collect::<Vec<FieldData>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn schema_is_well_formed(schema in any::<SchemaData>()) {
            prop_assert!(schema.num_fields() >= schema.attributes.len());
            prop_assert!(!schema.domain.dimension.is_empty());
            if matches!(schema.array_type, ArrayType::Dense) {
                prop_assert!(schema.cells_per_tile().is_some());
            }
        }
    }
}
