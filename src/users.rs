//! Identity/role collaborator.
//!
//! Users and roles are resolved by id or name through `IdentityStore`;
//! failed user resolution falls back to the guest user rather than a
//! sentinel object. `MemoryIdentity` is the in-process reference
//! implementation, also used as the test double.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{WireError, WireResult};

pub const GUEST_USER_ID: u32 = 2;
pub const SUPERUSER_ID: u32 = 41;
pub const GUEST_ROLE_ID: u32 = 1;
pub const SUPER_ROLE_ID: u32 = 2;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u32,
    pub name: String,
    pass: String,
    pub roles: Vec<u32>,
}

impl User {
    pub fn new(id: u32, name: &str, pass: &str, roles: Vec<u32>) -> Self {
        Self {
            id,
            name: name.to_string(),
            pass: pass.to_string(),
            roles,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.id == GUEST_USER_ID
    }

    pub fn has_role(&self, role_id: u32) -> bool {
        self.roles.contains(&role_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: u32,
    pub name: String,
}

impl Role {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

pub trait IdentityStore {
    fn user_by_id(&self, id: u32) -> Option<Rc<User>>;
    fn user_by_name(&self, name: &str) -> Option<Rc<User>>;
    fn role_by_id(&self, id: u32) -> Option<Rc<Role>>;
    fn role_by_name(&self, name: &str) -> Option<Rc<Role>>;

    /// The null-object-free fallback for failed user resolution.
    fn guest(&self) -> Rc<User>;

    fn authenticate(&self, name: &str, pass: &str) -> Option<Rc<User>>;

    fn current_user(&self) -> Rc<User>;
    fn set_current_user(&self, user: Rc<User>);
    fn set_current_user_guest(&self) {
        self.set_current_user(self.guest());
    }

    // --- page/role assignment ---

    fn roles_for_page(&self, page_id: u32) -> Vec<Rc<Role>>;
    fn add_role_to_page(&self, role: &Rc<Role>, page_id: u32);
    fn remove_role_from_page(&self, role: &Rc<Role>, page_id: u32) -> WireResult<()>;
}

pub struct MemoryIdentity {
    users: RefCell<Vec<Rc<User>>>,
    roles: RefCell<Vec<Rc<Role>>>,
    page_roles: RefCell<HashMap<u32, Vec<Rc<Role>>>>,
    current: RefCell<Rc<User>>,
}

impl MemoryIdentity {
    /// Creates the store with the builtin guest and superuser accounts;
    /// the guest is the current user until a login happens.
    pub fn new() -> Self {
        let guest_role = Rc::new(Role::new(GUEST_ROLE_ID, "guest"));
        let super_role = Rc::new(Role::new(SUPER_ROLE_ID, "superuser"));
        let guest = Rc::new(User::new(GUEST_USER_ID, "guest", "", vec![GUEST_ROLE_ID]));
        let superuser = Rc::new(User::new(
            SUPERUSER_ID,
            "superuser",
            "",
            vec![GUEST_ROLE_ID, SUPER_ROLE_ID],
        ));
        Self {
            users: RefCell::new(vec![guest.clone(), superuser]),
            roles: RefCell::new(vec![guest_role, super_role]),
            page_roles: RefCell::new(HashMap::new()),
            current: RefCell::new(guest),
        }
    }

    pub fn add_user(&self, user: User) -> Rc<User> {
        let user = Rc::new(user);
        self.users.borrow_mut().push(user.clone());
        user
    }

    pub fn add_role(&self, role: Role) -> Rc<Role> {
        let role = Rc::new(role);
        self.roles.borrow_mut().push(role.clone());
        role
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for MemoryIdentity {
    fn user_by_id(&self, id: u32) -> Option<Rc<User>> {
        self.users.borrow().iter().find(|u| u.id == id).cloned()
    }

    fn user_by_name(&self, name: &str) -> Option<Rc<User>> {
        self.users.borrow().iter().find(|u| u.name == name).cloned()
    }

    fn role_by_id(&self, id: u32) -> Option<Rc<Role>> {
        self.roles.borrow().iter().find(|r| r.id == id).cloned()
    }

    fn role_by_name(&self, name: &str) -> Option<Rc<Role>> {
        self.roles.borrow().iter().find(|r| r.name == name).cloned()
    }

    fn guest(&self) -> Rc<User> {
        self.user_by_id(GUEST_USER_ID)
            .unwrap_or_else(|| Rc::new(User::new(GUEST_USER_ID, "guest", "", vec![GUEST_ROLE_ID])))
    }

    fn authenticate(&self, name: &str, pass: &str) -> Option<Rc<User>> {
        let user = self.user_by_name(name)?;
        if user.is_guest() || user.pass.is_empty() || user.pass != pass {
            return None;
        }
        Some(user)
    }

    fn current_user(&self) -> Rc<User> {
        self.current.borrow().clone()
    }

    fn set_current_user(&self, user: Rc<User>) {
        *self.current.borrow_mut() = user;
    }

    fn roles_for_page(&self, page_id: u32) -> Vec<Rc<Role>> {
        self.page_roles
            .borrow()
            .get(&page_id)
            .cloned()
            .unwrap_or_default()
    }

    fn add_role_to_page(&self, role: &Rc<Role>, page_id: u32) {
        let mut map = self.page_roles.borrow_mut();
        let roles = map.entry(page_id).or_default();
        if !roles.iter().any(|r| r.id == role.id) {
            roles.push(role.clone());
        }
    }

    fn remove_role_from_page(&self, role: &Rc<Role>, page_id: u32) -> WireResult<()> {
        if role.id == SUPER_ROLE_ID {
            return Err(WireError::Validation(
                "The superuser role may not be removed from a page".to_string(),
            ));
        }
        if let Some(roles) = self.page_roles.borrow_mut().get_mut(&page_id) {
            roles.retain(|r| r.id != role.id);
        }
        Ok(())
    }
}
