pub mod spiral;
