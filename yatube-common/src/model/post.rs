use crate::model::{
    Id,
    form::{FormErrors, INVALID_CHOICE, REQUIRED},
    group::{Group, GroupMarker},
    user::{User, UserMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor},
};
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

/// Number of leading characters a post is displayed by.
pub const POST_DISPLAY_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: User,
    pub group: Option<Group>,
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let end = self
            .text
            .char_indices()
            .nth(POST_DISPLAY_LEN)
            .map_or(self.text.len(), |(index, _)| index);

        f.write_str(&self.text[..end])
    }
}

/// The author-editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostContent {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

/// Submitted post fields. Anything else in the submission (an author, say) is ignored.
///
/// Field values are taken the way a browser form would send them: `text` may be
/// null or a number, `group` may be an id in a string. Values that cannot be
/// read surface from [`PostForm::clean`] as field errors.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostForm {
    #[serde(default, deserialize_with = "submitted_text")]
    pub text: String,
    #[serde(default)]
    pub group: GroupChoice,
}

/// The `group` field of a submitted post form.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum GroupChoice {
    #[default]
    Unset,
    Group(Id<GroupMarker>),
    /// Submitted, but not a group id. Kept so the form can be shown again as sent.
    Invalid(String),
}

impl From<Option<Id<GroupMarker>>> for GroupChoice {
    fn from(group: Option<Id<GroupMarker>>) -> Self {
        group.map_or(Self::Unset, Self::Group)
    }
}

impl Serialize for GroupChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            Self::Group(id) => id.serialize(serializer),
            Self::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for GroupChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(GroupChoiceVisitor)
    }
}

struct GroupChoiceVisitor;

impl<'de> Visitor<'de> for GroupChoiceVisitor {
    type Value = GroupChoice;

    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("a group id")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(GroupChoice::Unset)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(GroupChoice::Unset)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(GroupChoice::Group(Id::new(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(i64::try_from(v).map_or_else(
            |_| GroupChoice::Invalid(v.to_string()),
            |id| GroupChoice::Group(Id::new(id)),
        ))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(GroupChoice::Invalid(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(GroupChoice::Invalid(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Ok(GroupChoice::Unset);
        }

        Ok(trimmed.parse().map_or_else(
            |_| GroupChoice::Invalid(v.to_owned()),
            |id| GroupChoice::Group(Id::new(id)),
        ))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(GroupChoice::Invalid(String::new()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(GroupChoice::Invalid(String::new()))
    }
}

/// Null reads as empty and scalars read as their text, so only [`PostForm::clean`] judges them.
fn submitted_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
            f.write_str("text")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(self)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

impl PostForm {
    #[must_use]
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post.group.as_ref().map(|group| group.id).into(),
        }
    }

    /// Validates against the groups a post may be filed under.
    pub fn clean(&self, group_choices: &[Group]) -> Result<PostContent, FormErrors> {
        let mut errors = FormErrors::new();

        let text = self.text.trim();
        if text.is_empty() {
            errors.add("text", REQUIRED);
        }

        let group = match &self.group {
            GroupChoice::Unset => None,
            GroupChoice::Group(group) if group_choices.iter().any(|choice| choice.id == *group) => {
                Some(*group)
            }
            GroupChoice::Group(_) | GroupChoice::Invalid(_) => {
                errors.add("group", INVALID_CHOICE);
                None
            }
        };

        errors.finish(PostContent {
            text: text.to_owned(),
            group,
        })
    }
}
