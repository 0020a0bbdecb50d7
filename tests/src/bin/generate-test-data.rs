use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 3;
const NUM_POSTS: usize = 20;
const NUM_COMMENTS: usize = 150;
const NUM_LIKES: usize = 300;
const NUM_REPLIES: usize = 300;

const CONTENT_WORDS: usize = 25;

fn gen_n_items(table: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    println!("INSERT INTO {} VALUES", table);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn gen_date() -> String {
    let mut rng = rand::thread_rng();
    let days = rng.gen_range(0..30);
    let secs = rng.gen_range(0..86_400);
    format!(
        "'{}'",
        (Utc::now() - Duration::days(days) - Duration::seconds(secs)).to_rfc3339()
    )
}

fn main() {
    // One shared hash keeps the generator quick; every seeded account logs in
    // with the password "password"
    let password_hash = bcrypt::hash("password", 10).expect("hashing seed password");

    let mut users = Vec::new();
    gen_n_items("users", NUM_USERS, |i| {
        let id = Uuid::new_v4();
        let name = format!("user{i}");
        users.push((id, name.clone()));
        format!(
            "('{}', {}, '{}@example.com', {}, true, {})",
            id,
            quoted(&name),
            name,
            quoted(&password_hash),
            gen_date(),
        )
    });
    let users = users;
    let gen_user = || -> (Uuid, String) {
        users
            .choose(&mut rand::thread_rng())
            .expect("users are nonempty")
            .clone()
    };

    let mut posts = Vec::new();
    gen_n_items("posts", NUM_POSTS, |_| {
        let id = Uuid::new_v4();
        posts.push(id);
        let date = gen_date();
        format!(
            "('{}', '{}', {}, {}, 'https://images.invalid/blogs/{}/cover.png', 'blogs/{}', {}, {})",
            id,
            gen_user().0,
            quoted(&lipsum::lipsum_title()),
            quoted(&lipsum::lipsum_words(CONTENT_WORDS)),
            id,
            id,
            date,
            date,
        )
    });
    let posts = posts;
    let gen_post = || -> Uuid {
        *posts
            .choose(&mut rand::thread_rng())
            .expect("posts are nonempty")
    };

    let mut comments = Vec::new();
    gen_n_items("comments", NUM_COMMENTS, |_| {
        let id = Uuid::new_v4();
        comments.push(id);
        let author = gen_user();
        let date = gen_date();
        format!(
            "('{}', '{}', '{}', {}, {}, {}, {})",
            id,
            gen_post(),
            author.0,
            quoted(&author.1),
            quoted(&lipsum::lipsum_words(CONTENT_WORDS)),
            date,
            date,
        )
    });
    let comments = comments;
    let gen_comment = || -> Uuid {
        *comments
            .choose(&mut rand::thread_rng())
            .expect("comments are nonempty")
    };

    gen_n_items("comment_likes", NUM_LIKES, |_| {
        format!("('{}', '{}')", gen_comment(), gen_user().0)
    });

    gen_n_items("comment_replies", NUM_REPLIES, |i| {
        let author = gen_user();
        let (mentioned_id, mentioned_name) = match rand::thread_rng().gen_bool(0.5) {
            true => {
                let m = gen_user();
                (format!("'{}'", m.0), quoted(&m.1))
            }
            false => (String::from("NULL"), String::from("NULL")),
        };
        format!(
            "('{}', '{}', {}, '{}', {}, {}, {}, {}, {})",
            Uuid::new_v4(),
            gen_comment(),
            i,
            author.0,
            quoted(&author.1),
            mentioned_id,
            mentioned_name,
            quoted(&lipsum::lipsum_words(CONTENT_WORDS)),
            gen_date(),
        )
    });
}
