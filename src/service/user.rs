use crate::core::IdentityError;
use nix::unistd::{Gid, Group, User, getgrouplist, getuid};
use serde::Serialize;
use std::ffi::CString;

/// Identity of the user running the service, captured once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub name: String,
    pub full_name: String,
    pub user_id: u32,
    pub group_id: u32,
    pub home: String,
    pub shell: String,
    pub groups: Vec<String>,
}

impl UserSnapshot {
    /// Looks up the current uid in the user and group databases.
    pub fn current() -> Result<Self, IdentityError> {
        let uid = getuid();
        let user = User::from_uid(uid)?.ok_or(IdentityError::UnknownUser(uid.as_raw()))?;

        let primary = Group::from_gid(user.gid)?
            .ok_or(IdentityError::UnknownGroup(user.gid.as_raw()))?;

        let name = CString::new(user.name.as_str())
            .map_err(|_| IdentityError::UnknownUser(uid.as_raw()))?;
        let supplementary = getgrouplist(&name, user.gid)?
            .into_iter()
            .filter_map(|gid| group_name(gid).ok().flatten());

        Ok(Self {
            name: user.name.clone(),
            full_name: user.gecos.to_string_lossy().into_owned(),
            user_id: user.uid.as_raw(),
            group_id: user.gid.as_raw(),
            home: user.dir.to_string_lossy().into_owned(),
            shell: user.shell.to_string_lossy().into_owned(),
            groups: ordered_groups(primary.name, supplementary),
        })
    }

    pub fn from_parts(
        name: impl Into<String>,
        full_name: impl Into<String>,
        user_id: u32,
        group_id: u32,
        home: impl Into<String>,
        shell: impl Into<String>,
        groups: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            user_id,
            group_id,
            home: home.into(),
            shell: shell.into(),
            groups,
        }
    }
}

fn group_name(gid: Gid) -> nix::Result<Option<String>> {
    Ok(Group::from_gid(gid)?.map(|group| group.name))
}

/// Primary group first, then the others in order, without duplicates.
pub fn ordered_groups(primary: String, others: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut groups = vec![primary];
    for group in others {
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}
