use prost::Message;

use super::{data::DataType, encode_node, Data, PbLink, PbNode};

/// The links field must come before the data field on the wire.
#[test]
fn links_before_data() {
    let link = PbLink {
        hash: Some(vec![0x01, 0x55, 0x12, 0x00]),
        name: Some("a".into()),
        tsize: Some(3),
    };
    let encoded = encode_node(&[link.clone()], Some(&[0x08, 0x01]));

    // first key is field 2, length delimited
    assert_eq!(0x12, encoded[0]);
    // the data field trails
    assert_eq!(&[0x0a, 0x02, 0x08, 0x01], &encoded[encoded.len() - 4..]);

    let decoded = PbNode::decode(encoded.as_slice()).expect("must decode");
    assert_eq!(vec![link], decoded.links);
    assert_eq!(Some(vec![0x08, 0x01]), decoded.data);
}

#[test]
fn empty_directory_envelope() {
    let data = Data {
        r#type: DataType::Directory as i32,
        ..Default::default()
    };

    assert_eq!(vec![0x08, 0x01], data.encode_to_vec());
    assert_eq!(
        vec![0x0a, 0x02, 0x08, 0x01],
        encode_node(&[], Some(&data.encode_to_vec()))
    );
}

/// blocksizes is a proto2 repeated field, which is not packed.
#[test]
fn blocksizes_unpacked() {
    let data = Data {
        r#type: DataType::File as i32,
        filesize: Some(3),
        blocksizes: vec![2, 1],
        ..Default::default()
    };

    assert_eq!(
        vec![0x08, 0x02, 0x18, 0x03, 0x20, 0x02, 0x20, 0x01],
        data.encode_to_vec()
    );
}
