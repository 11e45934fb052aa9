use nalgebra::base::*;

/// Area of triangle (p0, p1, p2)
pub fn triangle_area(p0: &Vector3<f64>, p1: &Vector3<f64>, p2: &Vector3<f64>) -> f64 {
    0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
}

/// Cotangent of the angle at `apex` in triangle (apex, pa, pb)
///
/// Flat angles do not divide by zero, the result is only very large and
/// meant to be clamped by the caller.
pub fn cotangent(apex: &Vector3<f64>, pa: &Vector3<f64>, pb: &Vector3<f64>) -> f64 {
    let vec_a = pa - apex;
    let vec_b = pb - apex;
    let dot = vec_a.dot(&vec_b);
    let cross = vec_a.cross(&vec_b).norm();
    let floor = (f64::EPSILON * vec_a.norm() * vec_b.norm()).max(f64::MIN_POSITIVE);
    dot / cross.max(floor)
}

/// Axis aligned bounding box of a set of points
pub fn bounding_box<'a, I>(points: I) -> Option<(Vector3<f64>, Vector3<f64>)>
where
    I: IntoIterator<Item = &'a Vector3<f64>>,
{
    points.into_iter().fold(None, |bbox, pt| match bbox {
        None => Some((*pt, *pt)),
        Some((min, max)) => Some((min.inf(pt), max.sup(pt))),
    })
}

/// Length of the bounding box diagonal (0 for an empty set)
pub fn bounding_diagonal<'a, I>(points: I) -> f64
where
    I: IntoIterator<Item = &'a Vector3<f64>>,
{
    match bounding_box(points) {
        Some((min, max)) => (max - min).norm(),
        None => 0.0,
    }
}

/// Checks every coordinate is finite
pub fn is_finite(point: &Vector3<f64>) -> bool {
    point.iter().all(|coord| coord.is_finite())
}
