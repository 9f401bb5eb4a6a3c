//! L2 normalization of embedding vectors.
//!
//! All vectors entering the index (and all query vectors) are normalized
//! to unit length so that inner-product search is equivalent to cosine
//! similarity. A zero vector has no direction and is mapped to itself
//! rather than dividing by zero.

/// L2-normalize a vector in place. A zero-norm vector is left untouched.
pub fn l2_normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
}

/// L2-normalize a vector, returning the normalized copy.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    l2_normalize_in_place(&mut vector);
    vector
}
