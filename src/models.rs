use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{
    expect_guid, expect_integer, expect_optional_integer, expect_optional_text, expect_text,
    Column, Entity, EnumMember, FieldKind, FieldValue, ValueError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameLevel {
    Beginner = 1,
    Intermediate = 2,
    Advanced = 3,
}

impl GameLevel {
    pub const ALL: [GameLevel; 3] = [
        GameLevel::Beginner,
        GameLevel::Intermediate,
        GameLevel::Advanced,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GameLevel::Beginner => "beginner",
            GameLevel::Intermediate => "intermediate",
            GameLevel::Advanced => "advanced",
        }
    }

    pub fn ordinal(self) -> i64 {
        self as i64
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.ordinal() == ordinal)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.name() == name)
    }
}

impl From<GameLevel> for EnumMember {
    fn from(level: GameLevel) -> Self {
        EnumMember {
            name: level.name(),
            ordinal: level.ordinal(),
        }
    }
}

impl From<GameLevel> for FieldValue {
    fn from(level: GameLevel) -> Self {
        FieldValue::Enum(level.into())
    }
}

// Users

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub game_level: Option<GameLevel>,
    pub password: Vec<u8>,
    pub places: Option<Vec<i64>>,
    pub full_name: String,
    pub email: String,
    pub age: i16,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A new user with a fresh identifier, not yet persisted.
    pub fn new(full_name: &str, email: &str, password: Vec<u8>, age: i16) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_level: None,
            password,
            places: None,
            full_name: full_name.to_string(),
            email: email.to_string(),
            age,
            description: None,
            created_at: Utc::now(),
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            game_level: None,
            password: Vec::new(),
            places: None,
            full_name: String::new(),
            email: String::new(),
            age: 0,
            description: None,
            created_at: DateTime::<Utc>::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    GameLevel,
    Password,
    Places,
    FullName,
    Email,
    Age,
    Description,
    CreatedAt,
}

impl Column for UserField {
    fn name(self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::GameLevel => "game_level",
            UserField::Password => "password",
            UserField::Places => "places",
            UserField::FullName => "full_name",
            UserField::Email => "email",
            UserField::Age => "age",
            UserField::Description => "description",
            UserField::CreatedAt => "created_at",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            UserField::Id => FieldKind::Guid,
            UserField::GameLevel => FieldKind::Enum,
            UserField::Password => FieldKind::Binary,
            UserField::Places => FieldKind::IntegerList,
            UserField::FullName | UserField::Email | UserField::Description => FieldKind::Text,
            UserField::Age => FieldKind::SmallInteger,
            UserField::CreatedAt => FieldKind::Timestamp,
        }
    }
}

impl Entity for User {
    type Field = UserField;

    const TABLE: &'static str = "users";
    const FIELDS: &'static [UserField] = &[
        UserField::Id,
        UserField::GameLevel,
        UserField::Password,
        UserField::Places,
        UserField::FullName,
        UserField::Email,
        UserField::Age,
        UserField::Description,
        UserField::CreatedAt,
    ];
    const KEY: &'static [UserField] = &[UserField::Id];

    fn get(&self, field: UserField) -> FieldValue {
        match field {
            UserField::Id => self.id.into(),
            UserField::GameLevel => self.game_level.into(),
            UserField::Password => self.password.clone().into(),
            UserField::Places => self.places.clone().into(),
            UserField::FullName => self.full_name.clone().into(),
            UserField::Email => self.email.clone().into(),
            UserField::Age => self.age.into(),
            UserField::Description => self.description.clone().into(),
            UserField::CreatedAt => self.created_at.into(),
        }
    }

    fn set(&mut self, field: UserField, value: FieldValue) -> Result<(), ValueError> {
        let name = field.name();
        match field {
            UserField::Id => self.id = expect_guid(name, value)?,
            UserField::GameLevel => {
                self.game_level = match &value {
                    FieldValue::Null => None,
                    FieldValue::Enum(member) => Some(
                        GameLevel::from_ordinal(member.ordinal)
                            .ok_or_else(|| ValueError::new(name, &value))?,
                    ),
                    FieldValue::Integer(ordinal) => Some(
                        GameLevel::from_ordinal(*ordinal)
                            .ok_or_else(|| ValueError::new(name, &value))?,
                    ),
                    FieldValue::Text(text) => Some(
                        GameLevel::from_name(text).ok_or_else(|| ValueError::new(name, &value))?,
                    ),
                    other => return Err(ValueError::new(name, other)),
                }
            }
            UserField::Password => {
                self.password = match value {
                    FieldValue::Binary(bytes) => {
                        check_password_len(bytes.len())?;
                        bytes
                    }
                    other => return Err(ValueError::new(name, &other)),
                }
            }
            UserField::Places => {
                self.places = match value {
                    FieldValue::Null => None,
                    FieldValue::IntegerList(places) => Some(places),
                    other => return Err(ValueError::new(name, &other)),
                }
            }
            UserField::FullName => self.full_name = expect_text(name, value)?,
            UserField::Email => self.email = expect_text(name, value)?,
            UserField::Age => {
                let age = expect_integer(name, value.clone())?;
                self.age = i16::try_from(age).map_err(|_| ValueError::new(name, &value))?;
            }
            UserField::Description => self.description = expect_optional_text(name, value)?,
            UserField::CreatedAt => {
                self.created_at = match value {
                    FieldValue::Timestamp(at) => at,
                    other => return Err(ValueError::new(name, &other)),
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ValueError> {
        check_password_len(self.password.len())
    }

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

/// Stored password hashes fit in 60 bytes.
pub const PASSWORD_MAX_LEN: usize = 60;

fn check_password_len(len: usize) -> Result<(), ValueError> {
    if len > PASSWORD_MAX_LEN {
        return Err(ValueError::TooLong {
            field: UserField::Password.name(),
            len,
            max: PASSWORD_MAX_LEN,
        });
    }
    Ok(())
}

// Cities and states

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct City {
    pub id: Option<i64>,
    pub name: String,
}

impl City {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityField {
    Id,
    Name,
}

impl Column for CityField {
    fn name(self) -> &'static str {
        match self {
            CityField::Id => "id",
            CityField::Name => "name",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            CityField::Id => FieldKind::Integer,
            CityField::Name => FieldKind::Text,
        }
    }
}

impl Entity for City {
    type Field = CityField;

    const TABLE: &'static str = "cities";
    const FIELDS: &'static [CityField] = &[CityField::Id, CityField::Name];
    const KEY: &'static [CityField] = &[CityField::Id];
    const GENERATED_KEY: Option<CityField> = Some(CityField::Id);

    fn get(&self, field: CityField) -> FieldValue {
        match field {
            CityField::Id => self.id.into(),
            CityField::Name => self.name.clone().into(),
        }
    }

    fn set(&mut self, field: CityField, value: FieldValue) -> Result<(), ValueError> {
        match field {
            CityField::Id => self.id = expect_optional_integer(field.name(), value)?,
            CityField::Name => self.name = expect_text(field.name(), value)?,
        }
        Ok(())
    }

    fn id_string(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub id: Option<i64>,
    pub name: String,
}

impl State {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    Id,
    Name,
}

impl Column for StateField {
    fn name(self) -> &'static str {
        match self {
            StateField::Id => "id",
            StateField::Name => "name",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            StateField::Id => FieldKind::Integer,
            StateField::Name => FieldKind::Text,
        }
    }
}

impl Entity for State {
    type Field = StateField;

    const TABLE: &'static str = "states";
    const FIELDS: &'static [StateField] = &[StateField::Id, StateField::Name];
    const KEY: &'static [StateField] = &[StateField::Id];
    const GENERATED_KEY: Option<StateField> = Some(StateField::Id);

    fn get(&self, field: StateField) -> FieldValue {
        match field {
            StateField::Id => self.id.into(),
            StateField::Name => self.name.clone().into(),
        }
    }

    fn set(&mut self, field: StateField, value: FieldValue) -> Result<(), ValueError> {
        match field {
            StateField::Id => self.id = expect_optional_integer(field.name(), value)?,
            StateField::Name => self.name = expect_text(field.name(), value)?,
        }
        Ok(())
    }

    fn id_string(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

// Locations

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub id: Option<i64>,
    pub city_id: Option<i64>,
    pub state_id: Option<i64>,
}

impl Location {
    pub fn new(city_id: Option<i64>, state_id: Option<i64>) -> Self {
        Self {
            id: None,
            city_id,
            state_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    Id,
    CityId,
    StateId,
}

impl Column for LocationField {
    fn name(self) -> &'static str {
        match self {
            LocationField::Id => "id",
            LocationField::CityId => "city_id",
            LocationField::StateId => "state_id",
        }
    }

    fn kind(self) -> FieldKind {
        FieldKind::Integer
    }
}

impl Entity for Location {
    type Field = LocationField;

    const TABLE: &'static str = "locations";
    const FIELDS: &'static [LocationField] = &[
        LocationField::Id,
        LocationField::CityId,
        LocationField::StateId,
    ];
    const KEY: &'static [LocationField] = &[LocationField::Id];
    const GENERATED_KEY: Option<LocationField> = Some(LocationField::Id);

    fn get(&self, field: LocationField) -> FieldValue {
        match field {
            LocationField::Id => self.id.into(),
            LocationField::CityId => self.city_id.into(),
            LocationField::StateId => self.state_id.into(),
        }
    }

    fn set(&mut self, field: LocationField, value: FieldValue) -> Result<(), ValueError> {
        let value = expect_optional_integer(field.name(), value)?;
        match field {
            LocationField::Id => self.id = value,
            LocationField::CityId => self.city_id = value,
            LocationField::StateId => self.state_id = value,
        }
        Ok(())
    }

    fn id_string(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }
}

// User <-> location link

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLocationAssociation {
    pub user_id: Uuid,
    pub location_id: i64,
}

impl UserLocationAssociation {
    pub fn new(user_id: Uuid, location_id: i64) -> Self {
        Self {
            user_id,
            location_id,
        }
    }
}

impl Default for UserLocationAssociation {
    fn default() -> Self {
        Self {
            user_id: Uuid::nil(),
            location_id: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLocationField {
    UserId,
    LocationId,
}

impl Column for UserLocationField {
    fn name(self) -> &'static str {
        match self {
            UserLocationField::UserId => "user_id",
            UserLocationField::LocationId => "location_id",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            UserLocationField::UserId => FieldKind::Guid,
            UserLocationField::LocationId => FieldKind::Integer,
        }
    }
}

impl Entity for UserLocationAssociation {
    type Field = UserLocationField;

    const TABLE: &'static str = "user_location_association";
    const FIELDS: &'static [UserLocationField] =
        &[UserLocationField::UserId, UserLocationField::LocationId];
    const KEY: &'static [UserLocationField] =
        &[UserLocationField::UserId, UserLocationField::LocationId];

    fn get(&self, field: UserLocationField) -> FieldValue {
        match field {
            UserLocationField::UserId => self.user_id.into(),
            UserLocationField::LocationId => self.location_id.into(),
        }
    }

    fn set(&mut self, field: UserLocationField, value: FieldValue) -> Result<(), ValueError> {
        match field {
            UserLocationField::UserId => self.user_id = expect_guid(field.name(), value)?,
            UserLocationField::LocationId => {
                self.location_id = expect_integer(field.name(), value)?
            }
        }
        Ok(())
    }

    /// Composite key, `user:location`.
    fn id_string(&self) -> String {
        format!("{}:{}", self.user_id, self.location_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_level_ordinals_and_names() {
        assert_eq!(GameLevel::Beginner.ordinal(), 1);
        assert_eq!(GameLevel::Advanced.ordinal(), 3);
        assert_eq!(GameLevel::from_ordinal(2), Some(GameLevel::Intermediate));
        assert_eq!(GameLevel::from_ordinal(4), None);
        assert_eq!(GameLevel::from_name("advanced"), Some(GameLevel::Advanced));
        assert_eq!(GameLevel::Intermediate.name(), "intermediate");
    }

    #[test]
    fn user_field_table_covers_every_column() {
        let user = User::new("Ana Gomez", "ana@example.com", b"hash".to_vec(), 31);
        for &field in User::FIELDS {
            let mut copy = User::default();
            copy.set(field, user.get(field)).unwrap();
            assert_eq!(copy.get(field), user.get(field), "{field:?}");
        }
    }

    #[test]
    fn user_rejects_values_of_the_wrong_kind() {
        let mut user = User::default();
        assert!(user.set(UserField::Age, "old".into()).is_err());
        assert!(user.set(UserField::Age, FieldValue::Integer(70_000)).is_err());
        assert!(user.set(UserField::Email, FieldValue::Null).is_err());
        assert!(user.set(UserField::GameLevel, FieldValue::Integer(9)).is_err());
        assert!(user.set(UserField::Password, FieldValue::Null).is_err());
        assert!(matches!(
            user.set(UserField::Password, vec![0u8; PASSWORD_MAX_LEN + 1].into()),
            Err(ValueError::TooLong { len: 61, max: 60, .. })
        ));
        user.set(UserField::Password, vec![0u8; PASSWORD_MAX_LEN].into())
            .unwrap();

        user.set(UserField::GameLevel, "beginner".into()).unwrap();
        assert_eq!(user.game_level, Some(GameLevel::Beginner));
        user.set(UserField::GameLevel, FieldValue::Integer(3)).unwrap();
        assert_eq!(user.game_level, Some(GameLevel::Advanced));
    }

    #[test]
    fn identifiers_render_as_strings() {
        let user = User::new("Ana", "ana@example.com", vec![1], 20);
        assert_eq!(user.id_string(), user.id.to_string());
        assert_eq!(user.id_string().len(), 36);

        let mut city = City::new("Rosario");
        assert_eq!(city.id_string(), "");
        city.id = Some(7);
        assert_eq!(city.id_string(), "7");

        let link = UserLocationAssociation::new(user.id, 4);
        assert_eq!(link.id_string(), format!("{}:4", user.id));
    }
}
