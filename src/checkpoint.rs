//! Parameter snapshots stored as safetensors files.

use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use itertools::Itertools;
use tracing::info;

use crate::error::{Error, Result};

pub const CHECKPOINT_FILE: &str = "model_state.safetensors";

/// `model_state.safetensors` in the directory of the running executable.
pub fn default_path() -> Result<PathBuf> {
    Ok(std::env::current_exe()?.with_file_name(CHECKPOINT_FILE))
}

pub fn save<P: AsRef<Path>>(varmap: &VarMap, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    varmap.save(path)?;
    info!(path = %path.display(), "saved model parameters");
    Ok(())
}

/// Copies the stored tensors into `varmap`. The file must hold exactly the
/// same parameter names and shapes as the map.
pub fn load<P: AsRef<Path>>(varmap: &VarMap, path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::MissingCheckpoint(path.to_path_buf()));
    }
    let incompatible = |reason: String| Error::IncompatibleCheckpoint {
        path: path.to_path_buf(),
        reason,
    };

    let vars = varmap
        .data()
        .lock()
        .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
    let device = vars
        .values()
        .next()
        .map(|var| var.device().clone())
        .unwrap_or(Device::Cpu);
    let stored = candle_core::safetensors::load(path, &device)?;

    let missing = vars.keys().filter(|name| !stored.contains_key(*name)).sorted().join(", ");
    if !missing.is_empty() {
        return Err(incompatible(format!("missing parameters: {missing}")));
    }
    let unexpected = stored.keys().filter(|name| !vars.contains_key(*name)).sorted().join(", ");
    if !unexpected.is_empty() {
        return Err(incompatible(format!("unexpected parameters: {unexpected}")));
    }
    for (name, var) in vars.iter() {
        let tensor = &stored[name];
        if tensor.shape() != var.shape() {
            return Err(incompatible(format!(
                "{name} has shape {:?} on disk but {:?} in the model",
                tensor.dims(),
                var.dims()
            )));
        }
    }
    for (name, var) in vars.iter() {
        var.set(&stored[name].to_dtype(var.dtype())?)?;
    }
    info!(path = %path.display(), tensors = stored.len(), "loaded model parameters");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::{Init, VarBuilder};

    fn varmap_with(shapes: &[(&str, (usize, usize))]) -> VarMap {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        for (name, shape) in shapes {
            vs.get_with_hints(*shape, name, Init::Randn { mean: 0.0, stdev: 1.0 })
                .unwrap();
        }
        varmap
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let varmap = varmap_with(&[("w", (2, 2))]);
        let err = load(&varmap, dir.path().join("nope.safetensors")).unwrap_err();
        assert!(matches!(err, Error::MissingCheckpoint(_)));
    }

    #[test]
    fn round_trip_is_exact() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(CHECKPOINT_FILE);
        let source = varmap_with(&[("w", (3, 2)), ("b", (1, 2))]);
        save(&source, &path)?;

        let target = varmap_with(&[("w", (3, 2)), ("b", (1, 2))]);
        load(&target, &path)?;
        let source = source.data().lock().unwrap();
        let target = target.data().lock().unwrap();
        for name in ["w", "b"] {
            assert_eq!(
                source[name].as_tensor().to_vec2::<f32>()?,
                target[name].as_tensor().to_vec2::<f32>()?
            );
        }
        Ok(())
    }

    #[test]
    fn shape_and_name_mismatches_are_incompatible() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CHECKPOINT_FILE);
        save(&varmap_with(&[("w", (3, 2))]), &path)?;

        let reshaped = varmap_with(&[("w", (2, 3))]);
        assert!(matches!(
            load(&reshaped, &path),
            Err(Error::IncompatibleCheckpoint { .. })
        ));
        let renamed = varmap_with(&[("v", (3, 2))]);
        assert!(matches!(
            load(&renamed, &path),
            Err(Error::IncompatibleCheckpoint { .. })
        ));
        Ok(())
    }
}
