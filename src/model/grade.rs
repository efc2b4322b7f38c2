/// Labels a term's collinearity from its adjusted GVIF, `GVIF^(1/(2·df))`.
///
/// The adjusted value is on the standard-error scale, so the usual VIF cut-offs
/// of 5 and 10 become their square roots.
///
/// | Adjusted GVIF | Label    |
/// |---------------|----------|
/// | < √5 (2.236)  | low      |
/// | < √10 (3.162) | moderate |
/// | otherwise     | high     |
pub fn collinearity_grade(adjusted_gvif: f64) -> String {
    match adjusted_gvif {
        g if g < 5.0_f64.sqrt() => "low".into(),
        g if g < 10.0_f64.sqrt() => "moderate".into(),
        _ => "high".into(),
    }
}
