/// NPY array reader and writer module.
pub mod npy;
