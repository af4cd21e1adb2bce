use crate::hash::{object_digest, ObjectId};

/// blob object: opaque file content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub content: Vec<u8>,
}

impl Blob {
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }

    pub fn id(&self) -> ObjectId {
        object_digest("blob", &self.content)
    }
}
