use proptest::prelude::*;

use super::*;

const DIMENSION_DATATYPES: [Datatype; 10] = [
    Datatype::Int8,
    Datatype::Int16,
    Datatype::Int32,
    Datatype::Int64,
    Datatype::UInt8,
    Datatype::UInt16,
    Datatype::UInt32,
    Datatype::UInt64,
    Datatype::Float32,
    Datatype::Float64,
];

fn prop_datatype() -> impl Strategy<Value = Datatype> {
    prop_oneof![
        Just(Datatype::Int8),
        Just(Datatype::Int16),
        Just(Datatype::Int32),
        Just(Datatype::Int64),
        Just(Datatype::UInt8),
        Just(Datatype::UInt16),
        Just(Datatype::UInt32),
        Just(Datatype::UInt64),
        Just(Datatype::Float32),
        Just(Datatype::Float64),
        Just(Datatype::Byte),
        Just(Datatype::Char),
    ]
}

fn prop_datatype_for_dense_dimension() -> impl Strategy<Value = Datatype> {
    /* see `Datatype::is_allowed_dimension_type_dense`: no floats */
    proptest::strategy::Union::new(
        DIMENSION_DATATYPES
            .iter()
            .filter(|dt| dt.is_integral_type())
            .map(|dt| Just(*dt)),
    )
}

fn prop_datatype_for_sparse_dimension() -> impl Strategy<Value = Datatype> {
    /* see `Datatype::is_allowed_dimension_type_sparse` */
    proptest::strategy::Union::new(DIMENSION_DATATYPES.iter().map(|dt| Just(*dt)))
}

#[derive(Clone, Debug, Default)]
pub enum DatatypeContext {
    #[default]
    Any,
    DenseDimension,
    SparseDimension,
    Fixed(Datatype),
}

impl Arbitrary for Datatype {
    type Parameters = DatatypeContext;
    type Strategy = BoxedStrategy<Datatype>;

    fn arbitrary_with(p: Self::Parameters) -> Self::Strategy {
        match p {
            DatatypeContext::Any => prop_datatype().boxed(),
            DatatypeContext::DenseDimension => {
                prop_datatype_for_dense_dimension().boxed()
            }
            DatatypeContext::SparseDimension => {
                prop_datatype_for_sparse_dimension().boxed()
            }
            DatatypeContext::Fixed(dt) => Just(dt).boxed(),
        }
    }
}
