pub mod arcface_embedder;
pub mod gallery_loader;
