use uuid::Uuid;

use crate::{validate_email, validate_required, validate_string, Error, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}

/// Self-service registration; the account starts unverified and is usable
/// only after the emailed token comes back through verifymail
#[derive(Clone, Debug, bolero::generator::TypeGenerator, serde::Deserialize, serde::Serialize)]
pub struct SignUp {
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub username: String,
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub email: String,
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub password: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("username", &self.username)?;
        validate_required("password", &self.password)?;
        validate_email(&self.email)?;
        Ok(())
    }
}

/// Admin-created account, pre-verified; used for operational bootstrap
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(id: UserId, name: String, email: String, password: String) -> NewUser {
        NewUser {
            id,
            name,
            email,
            password,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_required("name", &self.name)?;
        validate_required("password", &self.password)?;
        validate_email(&self.email)?;
        Ok(())
    }
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub user: String,
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub password: String,
    #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
    pub device: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("user", &self.user)?;
        validate_required("password", &self.password)?;
        validate_string(&self.device)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VerifyEmail {
    pub token: Uuid,
}
