use common::{FetchRequest, Image};
use rand::rng;
use rand::seq::SliceRandom;

/// Shuffle a bundled list and keep `maximum_entries` of it
pub fn pick(images: &[Image], request: &FetchRequest) -> Vec<Image> {
    let mut picked = images.to_vec();
    picked.shuffle(&mut rng());
    picked.truncate(request.maximum_entries);
    picked
}

/// A source that is itself an image URL
pub fn direct(source: &str) -> Vec<Image> {
    vec![Image::new(source)]
}
