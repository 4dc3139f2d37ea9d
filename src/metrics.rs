use candle_core::{DType, Result, Tensor};

/// Mean binary cross-entropy between `sigmoid(logits)` and multi-hot
/// `targets`, computed as `max(x, 0) - x * y + log(1 + exp(-|x|))`.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let targets = targets.to_dtype(logits.dtype())?;
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    (logits.relu()? - logits.mul(&targets)?)?
        .add(&softplus)?
        .mean_all()
}

/// Micro-averaged F1 of `predictions >= threshold` against multi-hot
/// `targets`: true/false positives and negatives are pooled over every
/// node-class pair. Returns 0 when neither side has a positive.
pub fn micro_f1(predictions: &Tensor, targets: &Tensor, threshold: f64) -> Result<f64> {
    let predicted = predictions.ge(threshold)?.to_dtype(DType::F64)?;
    let actual = targets.to_dtype(DType::F64)?;
    let true_positives = predicted.mul(&actual)?.sum_all()?.to_scalar::<f64>()?;
    let predicted_positives = predicted.sum_all()?.to_scalar::<f64>()?;
    let actual_positives = actual.sum_all()?.to_scalar::<f64>()?;

    let denominator = predicted_positives + actual_positives;
    if denominator == 0.0 {
        Ok(0.0)
    } else {
        Ok(2.0 * true_positives / denominator)
    }
}
