use serde::{Deserialize, Serialize};

use super::{FeatureOp, FeatureOperator, FilterBank, FilterKind};
use crate::error::ConfigurationError;
use crate::imaging::Resolution;

/// A named, user-selectable feature set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCalculator {
    pub name: String,
    pub bank: FilterBank,
}

impl FeatureCalculator {
    /// Smoothing, gradient and Laplacian responses at two scales.
    pub fn default_multiscale() -> Self {
        Self {
            name: "Default multiscale features".to_string(),
            bank: FilterBank {
                filters: FilterKind::ALL.to_vec(),
                sigmas: vec![1.0, 2.0],
                channels: None,
            },
        }
    }

    pub fn produces_channels(&self) -> bool {
        !self.bank.filters.is_empty()
            && !self.bank.sigmas.is_empty()
            && self.bank.channels.as_ref().is_none_or(|c| !c.is_empty())
    }
}

impl Default for FeatureCalculator {
    fn default() -> Self {
        Self::default_multiscale()
    }
}

/// Build the base feature operator for a calculator at a resolution.
pub fn compose(
    calculator: Option<&FeatureCalculator>,
    resolution: &Resolution,
) -> Result<FeatureOperator, ConfigurationError> {
    let calculator = calculator.ok_or(ConfigurationError::NoFeatureCalculator)?;
    if !calculator.produces_channels() {
        return Err(ConfigurationError::NoFeatureChannels);
    }
    Ok(FeatureOperator::new(resolution.clone())
        .append(FeatureOp::FilterBank(calculator.bank.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::PixelCalibration;

    #[test]
    fn compose_requires_a_calculator() {
        let resolution = Resolution::full(&PixelCalibration::uncalibrated());
        assert_eq!(
            compose(None, &resolution),
            Err(ConfigurationError::NoFeatureCalculator)
        );
    }

    #[test]
    fn compose_rejects_empty_banks() {
        let resolution = Resolution::full(&PixelCalibration::uncalibrated());
        let mut calculator = FeatureCalculator::default_multiscale();
        calculator.bank.sigmas.clear();
        assert_eq!(
            compose(Some(&calculator), &resolution),
            Err(ConfigurationError::NoFeatureChannels)
        );
    }

    #[test]
    fn composed_operator_is_bound_to_resolution() {
        let resolution = Resolution::defaults(&PixelCalibration::uncalibrated())[2].clone();
        let operator = compose(Some(&FeatureCalculator::default()), &resolution).unwrap();
        assert_eq!(operator.resolution(), &resolution);
        assert_eq!(operator.channel_names(&["Gray".into()]).len(), 6);
    }
}
