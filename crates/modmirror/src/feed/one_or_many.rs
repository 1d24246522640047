//! (De)serializing method which represents no items as null, one item as that item itself, and
//! many items as a list.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn deserialize<'a, T, D>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'a>,
    T: Deserialize<'a>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NullOrItemOrListOfItems<T> {
        Item(Option<T>),
        List(Vec<T>),
    }

    let repr = NullOrItemOrListOfItems::<T>::deserialize(d)?;

    Ok(match repr {
        NullOrItemOrListOfItems::Item(item) => item.into_iter().collect(),
        NullOrItemOrListOfItems::List(list) => list,
    })
}

pub fn serialize<T, S>(value: &[T], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    #[derive(Serialize)]
    #[serde(untagged)]
    enum NullOrItemOrListOfItems<'a, T: Serialize> {
        Item(Option<&'a T>),
        List(&'a [T]),
    }

    let repr = if value.len() >= 2 {
        NullOrItemOrListOfItems::List(value)
    } else {
        NullOrItemOrListOfItems::Item(value.first())
    };

    repr.serialize(s)
}
