use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Failure {
    success: bool,
    message: String,
}

impl Failure {
    pub fn new(message: &str) -> Self {
        Failure {
            success: false,
            message: message.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Ack {
    success: bool,
    message: String,
}

impl Ack {
    pub fn ok(message: &str) -> Self {
        Ack {
            success: true,
            message: message.to_owned(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failure_envelope_shape() {
        let body = serde_json::to_value(Failure::new("nope")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "nope");
    }
}
