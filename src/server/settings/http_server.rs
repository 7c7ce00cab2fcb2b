use serde::Deserialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplicationSettings {
    #[serde_as(as = "DisplayFromStr")]
    pub port: u16,
    pub host: String,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
