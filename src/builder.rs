use http::header::{HeaderName, HeaderValue};
use url::Url;

use crate::descriptor::RequestDescriptor;
use crate::encode::{QueryParametersFormatter, RequestBodyEncoder, RequestParametersEncoder};
use crate::error::Error;
use crate::request::TransportRequest;
use crate::Result;

/// Caller-supplied hook that runs last during the build, free to override any
/// computed field. Its failure fails the build.
pub type ConfigureRequest = dyn Fn(&mut TransportRequest) -> Result<()> + Send + Sync;

/// Composes the encoders into one transport request per attempt.
///
/// Building is a pure function of the descriptor and the configure hook: no
/// side effects beyond the returned request, so the processor can safely
/// rebuild on every retry.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestBuilder {
    query_formatter: QueryParametersFormatter,
    parameters_encoder: RequestParametersEncoder,
    body_encoder: RequestBodyEncoder,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<D>(
        &self,
        descriptor: &D,
        configure: Option<&ConfigureRequest>,
    ) -> Result<TransportRequest>
    where
        D: RequestDescriptor + ?Sized,
    {
        let domain = descriptor.domain_name();
        let path = descriptor.path();
        let full_path = [domain.as_str(), path.as_str()].join("/");
        if domain.is_empty() {
            return Err(Error::BadUrl { url: full_path });
        }
        let url = Url::parse(&full_path).map_err(|_| Error::BadUrl {
            url: full_path.clone(),
        })?;

        let mut request = TransportRequest::new(url, descriptor.method());
        request.cache_policy = descriptor.cache_policy();
        request.timeout = descriptor.timeout();

        if let Some(headers) = descriptor.headers() {
            for (name, value) in &headers {
                let name =
                    HeaderName::from_bytes(name.as_bytes()).map_err(|source| {
                        Error::InvalidHeaderName {
                            name: name.clone(),
                            source,
                        }
                    })?;
                let value =
                    HeaderValue::from_str(value).map_err(|source| Error::InvalidHeaderValue {
                        name: name.to_string(),
                        source,
                    })?;
                request.headers.append(name, value);
            }
        }

        if let Some(parameters) = descriptor.query_parameters() {
            let pairs = self.query_formatter.format(&parameters);
            self.parameters_encoder.encode(&pairs, &mut request);
        }

        if let Some(body) = descriptor.body() {
            self.body_encoder.encode(&body, &mut request)?;
        }

        if let Some(configure) = configure {
            configure(&mut request)?;
        }

        Ok(request)
    }
}
