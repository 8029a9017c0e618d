use proptest::prelude::*;

use cellstore_common::array::CellValNum;
use cellstore_common::datatype::Datatype;

use crate::array::attribute::AttributeData;

const ATTRIBUTE_NAME_REGEX: &str = "[a-zA-Z0-9_]+";

pub fn prop_attribute_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex(ATTRIBUTE_NAME_REGEX)
        .expect("Error creating attribute name strategy")
        .prop_filter(
            "Attribute names may not begin with reserved prefix",
            |name| !name.starts_with("__"),
        )
}

fn prop_fill(
    datatype: Datatype,
    cell_val_num: CellValNum,
) -> impl Strategy<Value = Option<Vec<u8>>> {
    let nvalues =
        cell_val_num.fixed().map(|nz| nz.get() as usize).unwrap_or(1);
    let nbytes = datatype.size() * nvalues;
    proptest::option::of(proptest::collection::vec(any::<u8>(), nbytes))
}

fn prop_attribute_for_datatype(
    datatype: Datatype,
) -> impl Strategy<Value = AttributeData> {
    (prop_attribute_name(), any::<CellValNum>()).prop_flat_map(
        move |(name, cell_val_num)| {
            prop_fill(datatype, cell_val_num).prop_map(move |fill| {
                AttributeData {
                    name: name.clone(),
                    datatype,
                    cell_val_num: Some(cell_val_num),
                    fill,
                }
            })
        },
    )
}

impl Arbitrary for AttributeData {
    type Parameters = Option<Datatype>;
    type Strategy = BoxedStrategy<AttributeData>;

    fn arbitrary_with(datatype: Self::Parameters) -> Self::Strategy {
        match datatype {
            Some(dt) => prop_attribute_for_datatype(dt).boxed(),
            None => any::<Datatype>()
                .prop_flat_map(prop_attribute_for_datatype)
                .boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn default_name(attribute in any::<AttributeData>()) {
            prop_assert!(!attribute.name.is_empty());
        }

        #[test]
        fn fill_is_cell_sized(attribute in any::<AttributeData>()) {
            if let Some(fill) = attribute.fill.as_ref() {
                let nvalues = attribute.cell_val_num().fixed().map(|nz| nz.get() as usize).unwrap_or(1);
                prop_assert_eq!(fill.len(), attribute.datatype.size() * nvalues);
            }
        }
    }
}
