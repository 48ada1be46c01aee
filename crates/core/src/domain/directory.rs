use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub org_id: OrgId,
    pub display_name: String,
    pub team_ids: Vec<String>,
}

impl User {
    pub fn shares_team_with(&self, other: &User) -> bool {
        self.team_ids.iter().any(|team| other.team_ids.contains(team))
    }
}

#[cfg(test)]
mod tests {
    use super::{OrgId, User, UserId};

    fn user(id: &str, teams: &[&str]) -> User {
        User {
            id: UserId(id.to_string()),
            org_id: OrgId("org-1".to_string()),
            display_name: id.to_string(),
            team_ids: teams.iter().map(|team| team.to_string()).collect(),
        }
    }

    #[test]
    fn shared_team_membership_is_detected() {
        let alice = user("alice", &["platform", "infra"]);
        let bob = user("bob", &["infra"]);
        let carol = user("carol", &["design"]);

        assert!(alice.shares_team_with(&bob));
        assert!(!alice.shares_team_with(&carol));
    }

    #[test]
    fn empty_team_lists_never_overlap() {
        let alice = user("alice", &[]);
        let bob = user("bob", &[]);

        assert!(!alice.shares_team_with(&bob));
    }
}
