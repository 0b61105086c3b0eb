//! Outgoing email. Sending happens on a spawned task and failures are
//! only logged.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, error, o, Logger};

use crate::donor::Donor;
use crate::errors::BackendError;
use crate::staff::Staff;

/// A message to one recipient.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn welcome(donor: &Donor) -> Self {
        Email {
            to: donor.email.clone(),
            subject: "Thank you for registering as a donor".to_owned(),
            body: format!(
                "Hello {},\n\nThank you for registering as a {} donor. We look forward to seeing you at one of our banks.\n",
                donor.first_name, donor.blood_type
            ),
        }
    }

    pub fn password_reset(staff: &Staff, link: &url::Url) -> Self {
        Email {
            to: staff.email.clone(),
            subject: "Password Reset Request".to_owned(),
            body: format!(
                "To reset your password, visit the following link:\n{}\n\nIf you did not make this request then simply ignore this email and no changes will be made.\n",
                link
            ),
        }
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> BoxFuture<'static, Result<(), BackendError>>;
}

/// Sends mail through an SMTP relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        server: &str,
        port: u16,
        username: String,
        password: String,
        from: &str,
    ) -> Result<Self, BackendError> {
        let transport = SmtpTransport::relay(server)
            .map_err(|e| BackendError::Mail(e.to_string()))?
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| BackendError::Mail(e.to_string()))?;

        Ok(SmtpMailer { transport, from })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: Email) -> BoxFuture<'static, Result<(), BackendError>> {
        let transport = self.transport.clone();
        let from = self.from.clone();

        async move {
            let to = email
                .to
                .parse::<Mailbox>()
                .map_err(|e| BackendError::Mail(e.to_string()))?;

            let message = Message::builder()
                .from(from)
                .to(to)
                .subject(email.subject)
                .body(email.body)
                .map_err(|e| BackendError::Mail(e.to_string()))?;

            // the SMTP client blocks
            tokio::task::spawn_blocking(move || transport.send(&message))
                .await
                .map_err(|e| BackendError::Mail(e.to_string()))?
                .map_err(|e| BackendError::Mail(e.to_string()))?;

            Ok(())
        }
        .boxed()
    }
}

/// Writes mail to the log instead of sending it, for when no SMTP
/// server is configured.
pub struct LogMailer {
    logger: Arc<Logger>,
}

impl LogMailer {
    pub fn new(logger: Arc<Logger>) -> Self {
        LogMailer { logger }
    }
}

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> BoxFuture<'static, Result<(), BackendError>> {
        debug!(self.logger, "Not sending email"; "to" => &email.to, "subject" => &email.subject, "body" => &email.body);

        futures::future::ready(Ok(())).boxed()
    }
}

/// Sends `email` in the background. `logger` should identify the
/// recipient by ID; the address itself stays out of the logs.
pub fn dispatch(logger: Arc<Logger>, mailer: Arc<dyn Mailer>, email: Email) {
    let logger = logger.new(o!("subject" => email.subject.clone()));

    tokio::spawn(async move {
        match mailer.send(email).await {
            Ok(()) => debug!(logger, "Sent email"),
            Err(e) => error!(logger, "Failed to send email: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::blood::BloodType;
    use crate::staff::Role;

    #[test]
    fn reset_emails_carry_the_link() {
        let staff = Staff {
            id: 3,
            first_name: "Grace".to_owned(),
            last_name: "Hopper".to_owned(),
            email: "grace@bank.example".to_owned(),
            password_hash: String::new(),
            role: Role::Admin,
            location_id: 1,
        };
        let link = url::Url::parse("https://bank.example/reset_password/abc").unwrap();

        let email = Email::password_reset(&staff, &link);

        assert_eq!(email.to, "grace@bank.example");
        assert!(email.body.contains("https://bank.example/reset_password/abc"));
    }

    #[test]
    fn welcome_emails_name_the_blood_type() {
        let donor = Donor {
            id: 1,
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            email: "ada@example.org".to_owned(),
            age: 36,
            blood_type: BloodType::AbNegative,
            last_blood_donation_date: None,
            last_plasma_donation_date: None,
        };

        let email = Email::welcome(&donor);

        assert_eq!(email.to, "ada@example.org");
        assert!(email.body.contains("AB-"));
    }

    #[test]
    fn senders_must_be_mailboxes() {
        let result = SmtpMailer::new(
            "smtp.example.org",
            587,
            "user".to_owned(),
            "pass".to_owned(),
            "not an address",
        );

        assert!(matches!(result, Err(BackendError::Mail(_))));
    }

    struct KeyRecorder(Arc<Mutex<Vec<String>>>);

    struct Keys(Vec<String>);

    impl slog::Serializer for Keys {
        fn emit_arguments(&mut self, key: slog::Key, _: &fmt::Arguments) -> slog::Result {
            self.0.push(key.to_string());
            Ok(())
        }
    }

    impl slog::Drain for KeyRecorder {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &slog::Record, values: &slog::OwnedKVList) -> Result<(), slog::Never> {
            use slog::KV;

            let mut keys = Keys(Vec::new());
            record.kv().serialize(record, &mut keys).unwrap();
            values.serialize(record, &mut keys).unwrap();
            self.0.lock().unwrap().extend(keys.0);

            Ok(())
        }
    }

    struct DownMailer;

    impl Mailer for DownMailer {
        fn send(&self, _email: Email) -> BoxFuture<'static, Result<(), BackendError>> {
            futures::future::ready(Err(BackendError::Mail("relay unreachable".to_owned()))).boxed()
        }
    }

    #[tokio::test]
    async fn dispatch_keeps_addresses_out_of_the_logs() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::root(KeyRecorder(keys.clone()), o!("donor_id" => 1));

        let email = Email {
            to: "someone@example.org".to_owned(),
            subject: "Hi".to_owned(),
            body: "Hello".to_owned(),
        };

        dispatch(Arc::new(logger), Arc::new(DownMailer), email);

        while keys.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let keys = keys.lock().unwrap();
        assert!(keys.iter().any(|k| k == "donor_id"));
        assert!(keys.iter().any(|k| k == "subject"));
        assert!(!keys.iter().any(|k| k == "to"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = LogMailer::new(Arc::new(log::discard()));

        let email = Email {
            to: "someone@example.org".to_owned(),
            subject: "Hi".to_owned(),
            body: "Hello".to_owned(),
        };

        assert!(mailer.send(email).await.is_ok());
    }
}
