use tracing::instrument;

use super::schema::{
    extract, to_bool, to_integer, to_string, to_string_list, FieldDecoder, Mode, Schema,
};
use super::Stage;
use crate::ast::Body;
use crate::error::DecodeError;
use crate::eval::EvaluationContext;

pub(crate) const SERVER: Schema = Schema {
    attributes: &["ip", "port", "secure", "http_methods"],
    required: &[],
    blocks: &[],
};

/// Listener settings plus the still-opaque hook blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub secure: Option<bool>,
    pub http_methods: Option<Vec<String>>,
    pub remainder: Body,
}

#[instrument(level = "debug", skip_all)]
pub fn decode_server(
    body: &Body,
    context: &EvaluationContext,
) -> Result<ServerConfig, DecodeError> {
    let mut decoder = FieldDecoder::new(context);
    let (content, remainder) = extract(body, &SERVER, "", Mode::Partial, decoder.diagnostics());

    let ip = decoder.decode(content.attribute("ip"), "", to_string);
    let port = decoder
        .decode(content.attribute("port"), "", to_integer)
        .and_then(|port| match u16::try_from(port) {
            Ok(port) => Some(port),
            Err(_) => {
                decoder.report("port", format!("port {} is out of range", port));
                None
            }
        });
    let secure = decoder.decode(content.attribute("secure"), "", to_bool);
    let http_methods = decoder
        .decode(content.attribute("http_methods"), "", to_string_list)
        .map(|methods| methods.into_iter().map(|m| m.to_uppercase()).collect());

    decoder.finish(
        Stage::Server,
        ServerConfig {
            ip,
            port,
            secure,
            http_methods,
            remainder,
        },
    )
}
