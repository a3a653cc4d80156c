//! Service-time composition for two-phase (prefill + decode) inference.
//!
//! All times are in milliseconds. With `n` requests batched together:
//!
//! - prefill time: `γ + δ · I · n`
//! - decode time per output token (the inter-token latency): `α + β · n`
//!
//! where `I` and `O` are the average input and output token counts. A
//! [`CompositionPolicy`] folds these into a per-request service time `T(n)`,
//! and the batch completes requests at `n / T(n)` per millisecond.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::model::ServiceRateProfile;

/// Prefill time coefficients: `gamma + delta * input_tokens * batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrefillParms {
    pub gamma: f64,
    pub delta: f64,
}

impl PrefillParms {
    pub fn prefill_time(&self, avg_input_tokens: f64, batch_size: f64) -> f64 {
        self.gamma + self.delta * avg_input_tokens * batch_size
    }
}

/// Decode time coefficients: `alpha + beta * batch_size` per output token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeParms {
    pub alpha: f64,
    pub beta: f64,
}

impl DecodeParms {
    pub fn decode_time(&self, batch_size: f64) -> f64 {
        self.alpha + self.beta * batch_size
    }
}

/// Prefill and decode parameters of an inference server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceParms {
    pub prefill: PrefillParms,
    pub decode: DecodeParms,
}

impl Default for ServiceParms {
    fn default() -> Self {
        Self {
            prefill: PrefillParms {
                gamma: 86.615,
                delta: 1.446e-3,
            },
            decode: DecodeParms {
                alpha: 6.958,
                beta: 0.042,
            },
        }
    }
}

impl ServiceParms {
    fn validate(&self) -> Result<()> {
        let coefficients = [
            ("gamma", self.prefill.gamma),
            ("delta", self.prefill.delta),
            ("alpha", self.decode.alpha),
            ("beta", self.decode.beta),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(QueueError::config(format!(
                    "{} must be non-negative and finite, got {}",
                    name, value
                )));
            }
        }
        if self.decode.alpha + self.decode.beta <= 0.0 {
            return Err(QueueError::config("alpha and beta cannot both be zero"));
        }
        Ok(())
    }
}

/// Average request size in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSize {
    #[serde(default = "default_input_tokens")]
    pub avg_input_tokens: u32,
    #[serde(default = "default_output_tokens")]
    pub avg_output_tokens: u32,
}

impl Default for RequestSize {
    fn default() -> Self {
        Self {
            avg_input_tokens: default_input_tokens(),
            avg_output_tokens: default_output_tokens(),
        }
    }
}

fn default_input_tokens() -> u32 {
    128
}

fn default_output_tokens() -> u32 {
    512
}

/// How prefill and decode combine into one per-request service time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPolicy {
    /// `T(n) = prefill(n) + (O − 1) · decode(n)`: prefill emits the first
    /// token, decode steps emit the rest.
    #[default]
    PrefillDecode,
    /// `T(n) = O · decode(n)`: prefill is ignored and every output token
    /// costs one decode step.
    DecodeOnly,
}

/// Maps service parameters and a request size onto a service-rate profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRateComposer {
    parms: ServiceParms,
    request_size: RequestSize,
    policy: CompositionPolicy,
}

impl ServiceRateComposer {
    pub fn new(
        parms: ServiceParms,
        request_size: RequestSize,
        policy: CompositionPolicy,
    ) -> Result<Self> {
        parms.validate()?;
        if request_size.avg_output_tokens == 0 {
            return Err(QueueError::config(
                "average output tokens must be positive",
            ));
        }
        if policy == CompositionPolicy::PrefillDecode
            && request_size.avg_output_tokens == 1
            && parms.prefill.prefill_time(request_size.avg_input_tokens as f64, 1.0) <= 0.0
        {
            return Err(QueueError::config(
                "single-token requests need a positive prefill time",
            ));
        }
        Ok(Self {
            parms,
            request_size,
            policy,
        })
    }

    pub fn parms(&self) -> &ServiceParms {
        &self.parms
    }

    pub fn request_size(&self) -> &RequestSize {
        &self.request_size
    }

    pub fn policy(&self) -> CompositionPolicy {
        self.policy
    }

    /// Prefill time (msec) at a possibly fractional batch size.
    pub fn prefill_time(&self, batch_size: f64) -> f64 {
        match self.policy {
            CompositionPolicy::PrefillDecode => self
                .parms
                .prefill
                .prefill_time(self.request_size.avg_input_tokens as f64, batch_size),
            CompositionPolicy::DecodeOnly => 0.0,
        }
    }

    /// Inter-token latency (msec) at a possibly fractional batch size.
    pub fn decode_time(&self, batch_size: f64) -> f64 {
        self.parms.decode.decode_time(batch_size)
    }

    /// Per-request service time (msec) with `batch_size` requests in service.
    pub fn service_time(&self, batch_size: f64) -> f64 {
        let output = self.request_size.avg_output_tokens as f64;
        match self.policy {
            CompositionPolicy::PrefillDecode => {
                self.prefill_time(batch_size) + (output - 1.0) * self.decode_time(batch_size)
            }
            CompositionPolicy::DecodeOnly => output * self.decode_time(batch_size),
        }
    }

    /// Service rates (requests/msec) for batch sizes `1..=max_batch_size`.
    pub fn compose(&self, max_batch_size: usize) -> Result<ServiceRateProfile> {
        if max_batch_size == 0 {
            return Err(QueueError::config("max batch size must be positive"));
        }
        let rates = (1..=max_batch_size)
            .map(|n| n as f64 / self.service_time(n as f64))
            .collect();
        let profile = ServiceRateProfile::new(rates)?;
        tracing::debug!(
            policy = ?self.policy,
            max_batch_size,
            min_rate = profile.first(),
            max_rate = profile.last(),
            "composed service rate profile"
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parms(gamma: f64, delta: f64, alpha: f64, beta: f64) -> ServiceParms {
        ServiceParms {
            prefill: PrefillParms { gamma, delta },
            decode: DecodeParms { alpha, beta },
        }
    }

    #[test]
    fn test_prefill_decode_formula() {
        let size = RequestSize {
            avg_input_tokens: 100,
            avg_output_tokens: 11,
        };
        let composer =
            ServiceRateComposer::new(parms(10.0, 0.01, 2.0, 0.5), size, CompositionPolicy::PrefillDecode)
                .unwrap();
        // prefill(4) = 10 + 0.01*100*4 = 14; decode(4) = 2 + 2 = 4; T = 14 + 10*4
        assert!((composer.service_time(4.0) - 54.0).abs() < 1e-12);
        let profile = composer.compose(4).unwrap();
        assert!((profile.rate(4) - 4.0 / 54.0).abs() < 1e-12);
    }

    #[test]
    fn test_decode_only_formula() {
        let size = RequestSize {
            avg_input_tokens: 0,
            avg_output_tokens: 1,
        };
        let composer =
            ServiceRateComposer::new(parms(0.0, 0.0, 1.0, 0.5), size, CompositionPolicy::DecodeOnly)
                .unwrap();
        let profile = composer.compose(10).unwrap();
        for n in 1..=10 {
            let expected = n as f64 / (1.0 + 0.5 * n as f64);
            assert!((profile.rate(n) - expected).abs() < 1e-12);
        }
        assert_eq!(composer.prefill_time(3.0), 0.0);
    }

    #[test]
    fn test_default_parms_profile_is_increasing() {
        let composer = ServiceRateComposer::new(
            ServiceParms::default(),
            RequestSize::default(),
            CompositionPolicy::default(),
        )
        .unwrap();
        let profile = composer.compose(256).unwrap();
        assert!(profile.as_slice().windows(2).all(|w| w[1] > w[0]));
        // ~27.9 requests/sec at full batch
        assert!((profile.last() * 1000.0 - 27.87).abs() < 0.05);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let size = RequestSize::default();
        let policy = CompositionPolicy::PrefillDecode;
        assert!(ServiceRateComposer::new(parms(1.0, 0.0, 0.0, 0.0), size, policy).is_err());
        assert!(ServiceRateComposer::new(parms(-1.0, 0.0, 1.0, 0.0), size, policy).is_err());
        assert!(ServiceRateComposer::new(parms(1.0, 0.0, 1.0, -0.1), size, policy).is_err());
        assert!(ServiceRateComposer::new(parms(1.0, f64::NAN, 1.0, 0.1), size, policy).is_err());

        let no_output = RequestSize {
            avg_input_tokens: 10,
            avg_output_tokens: 0,
        };
        assert!(ServiceRateComposer::new(parms(1.0, 0.0, 1.0, 0.1), no_output, policy).is_err());

        let single = RequestSize {
            avg_input_tokens: 0,
            avg_output_tokens: 1,
        };
        assert!(ServiceRateComposer::new(parms(0.0, 0.5, 1.0, 0.1), single, policy).is_err());
        assert!(
            ServiceRateComposer::new(parms(0.0, 0.5, 1.0, 0.1), single, CompositionPolicy::DecodeOnly)
                .is_ok()
        );
    }

    #[test]
    fn test_zero_batch_rejected() {
        let composer = ServiceRateComposer::new(
            ServiceParms::default(),
            RequestSize::default(),
            CompositionPolicy::default(),
        )
        .unwrap();
        assert!(matches!(composer.compose(0), Err(QueueError::Config(_))));
    }

    #[test]
    fn test_policy_serde() {
        let policy: CompositionPolicy = serde_json::from_str("\"decode_only\"").unwrap();
        assert_eq!(policy, CompositionPolicy::DecodeOnly);
        assert_eq!(
            serde_json::to_string(&CompositionPolicy::PrefillDecode).unwrap(),
            "\"prefill_decode\""
        );
    }
}
