use anyhow::Context;
use lettre::{
    message::header::ContentType,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

/// Outbound mail. When MAIL_HOST is not configured the verification mail is
/// traced instead of sent, which is what the test setups run with.
#[derive(Clone)]
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        public_url: String,
    },
    Log {
        public_url: String,
    },
}

impl Mailer {
    pub fn from_env() -> anyhow::Result<Mailer> {
        let public_url =
            std::env::var("PUBLIC_URL").context("PUBLIC_URL must be set to build mail links")?;
        match std::env::var("MAIL_HOST") {
            Err(_) => {
                tracing::warn!("MAIL_HOST is not set, verification mails will only be logged");
                Ok(Mailer::Log { public_url })
            }
            Ok(host) => {
                let user =
                    std::env::var("MAIL_USER").context("retrieving MAIL_USER environment variable")?;
                let pass =
                    std::env::var("MAIL_PASS").context("retrieving MAIL_PASS environment variable")?;
                let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .with_context(|| format!("building smtp transport to {host:?}"))?
                    .credentials(Credentials::new(user.clone(), pass))
                    .build();
                let from = user
                    .parse()
                    .with_context(|| format!("parsing MAIL_USER {user:?} as a mailbox"))?;
                Ok(Mailer::Smtp {
                    transport,
                    from,
                    public_url,
                })
            }
        }
    }

    pub fn log() -> Mailer {
        Mailer::Log {
            public_url: String::from("http://localhost:3000"),
        }
    }

    fn verification_link(public_url: &str, token: Uuid) -> String {
        format!("{}/verifyemail?token={}", public_url, token)
    }

    pub async fn send_verification(&self, to: &str, token: Uuid) -> anyhow::Result<()> {
        match self {
            Mailer::Log { public_url } => {
                let link = Self::verification_link(public_url, token);
                tracing::info!(%to, %link, "would send verification mail");
                Ok(())
            }
            Mailer::Smtp {
                transport,
                from,
                public_url,
            } => {
                let link = Self::verification_link(public_url, token);
                let body = format!(
                    r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Welcome!</h2>
  <p>Thank you for signing up. Please verify your email address by opening the link below:</p>
  <p><a href="{link}">Verify Email</a></p>
  <p>Or copy and paste this URL into your browser:</p>
  <p>{link}</p>
  <p>If you did not sign up for this account, please ignore this email.</p>
</div>"#
                );
                let mail = Message::builder()
                    .from(from.clone())
                    .to(to
                        .parse()
                        .with_context(|| format!("parsing recipient {to:?} as a mailbox"))?)
                    .subject("Verify your email")
                    .header(ContentType::TEXT_HTML)
                    .body(body)
                    .context("building verification mail")?;
                transport
                    .send(mail)
                    .await
                    .with_context(|| format!("sending verification mail to {to:?}"))?;
                Ok(())
            }
        }
    }
}
