pub mod embedding_matcher;
pub mod face_embedder;
pub mod gallery;
pub mod identity_matcher;
