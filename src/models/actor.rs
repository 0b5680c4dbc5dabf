use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Driver,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            other => Err(format!(
                "unknown role: {other}, expected customer/driver/admin"
            )),
        }
    }
}

/// The authenticated caller on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on behalf of any driver; drivers only on their own record.
    pub fn acts_for_driver(&self, driver_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Driver => self.id == driver_id,
            Role::Customer => false,
        }
    }

    /// Staff see every order; customers only their own.
    pub fn may_touch_order(&self, customer_id: Uuid) -> bool {
        match self.role {
            Role::Admin | Role::Driver => true,
            Role::Customer => self.id == customer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Actor, Role};

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" driver ".parse::<Role>().unwrap(), Role::Driver);
        assert!("courier".parse::<Role>().is_err());
    }

    #[test]
    fn customers_only_touch_their_own_orders() {
        let owner = Uuid::from_u128(1);
        let customer = Actor::new(owner, Role::Customer);
        let stranger = Actor::new(Uuid::from_u128(2), Role::Customer);
        let driver = Actor::new(Uuid::from_u128(3), Role::Driver);

        assert!(customer.may_touch_order(owner));
        assert!(!stranger.may_touch_order(owner));
        assert!(driver.may_touch_order(owner));
    }

    #[test]
    fn drivers_only_act_for_themselves() {
        let me = Uuid::from_u128(7);
        let driver = Actor::new(me, Role::Driver);
        assert!(driver.acts_for_driver(me));
        assert!(!driver.acts_for_driver(Uuid::from_u128(8)));
        assert!(Actor::new(Uuid::nil(), Role::Admin).acts_for_driver(me));
        assert!(!Actor::new(me, Role::Customer).acts_for_driver(me));
    }
}
