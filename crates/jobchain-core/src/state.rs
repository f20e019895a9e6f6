use crate::model::Chain;
use bytes::Bytes;

pub fn serialize_chain(chain: &Chain) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(chain).map(Bytes::from)
}

pub fn deserialize_chain(data: &[u8]) -> Result<Chain, serde_json::Error> {
    serde_json::from_slice(data)
}
