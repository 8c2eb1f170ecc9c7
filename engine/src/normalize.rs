/// Bring `vector` to exactly `required_len` entries.
///
/// Shorter vectors are zero-padded at the tail, longer ones keep their
/// first `required_len` entries. Zero reads as "feature absent" for every
/// classifier family the registry loads.
pub fn normalize(mut vector: Vec<f64>, required_len: usize) -> Vec<f64> {
    if vector.len() != required_len {
        vector.resize(required_len, 0.0);
    }
    vector
}
