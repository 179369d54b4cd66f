use std::process::Command;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BearerAuthConfig {
    token_cmd: String,
}

impl BearerAuthConfig {
    pub fn token(&self) -> String {
        let mut cmd_parts = self.token_cmd.split(' ');
        let mut cmd = Command::new(
            cmd_parts
                .next()
                .expect("token_cmd should specify a program"),
        );
        for part in cmd_parts {
            cmd.arg(part);
        }
        let output = cmd.output().expect("token_cmd should be executable");

        assert!(
            !output.stdout.is_empty(),
            "could not retrieve token from token_cmd"
        );

        String::from_utf8(output.stdout)
            .expect("token_cmd should evaluate to a token")
            .trim_end()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    Bearer(BearerAuthConfig),
}

impl AuthConfig {
    pub fn token(&self) -> String {
        match self {
            Self::Bearer(bearer) => bearer.token(),
        }
    }
}
