use anyhow::{Context, Result};
use aws_sdk_sns::Client;
use log::debug;

const ALERT_SUBJECT: &str = "Flight Hunter Alert";

pub fn verification_message(code: &str) -> String {
    format!("Your Flight Hunter verification code is: {code}")
}

/// Outbound dispatch: direct SMS for verification codes, topic publish for
/// deal alerts. Delivery itself is the notification service's problem.
pub struct Notifier {
    client: Client,
    topic_arn: String,
}

impl Notifier {
    pub fn new(client: Client, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }

    pub async fn send_sms(&self, phone_number: &str, message: &str) -> Result<()> {
        self.client
            .publish()
            .phone_number(phone_number)
            .message(message)
            .send()
            .await
            .context("failed to send SMS")?;

        debug!("SMS sent to {phone_number}");
        Ok(())
    }

    pub async fn publish_alert(&self, message: &str) -> Result<()> {
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(ALERT_SUBJECT)
            .message(message)
            .send()
            .await
            .context("failed to publish alert")?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_verification_message() {
        assert_eq!(
            verification_message("123456"),
            "Your Flight Hunter verification code is: 123456"
        );
    }

    #[test]
    fn test_verification_message_fits_one_sms_segment() {
        assert!(verification_message("999999").len() <= 160);
    }
}
